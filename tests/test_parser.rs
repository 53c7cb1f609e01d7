use sqlflow::{
    ast::Statement,
    dialect::Dialect,
    parser::{parse_sql, parse_statements},
    test_utils::{PARSING_TESTS_FILE, TestParsingData},
};

#[test]
fn test_parsing_cases() {
    let parsing_data_file =
        std::fs::read_to_string(PARSING_TESTS_FILE).expect("Cannot open parsing test cases");
    let test_parsing_data: TestParsingData =
        toml::from_str(&parsing_data_file).expect("Cannot parse test cases defined in toml");

    for test in test_parsing_data.tests {
        println!("Testing parsing for SQL: {}", &test.sql);
        let statements = parse_statements(&test.sql, test.dialect).collect::<Vec<_>>();
        if let Some(expected) = test.statements {
            assert_eq!(statements.len(), expected);
        }
        for parsed in &statements {
            let should_fail = test.invalid.contains(&parsed.index);
            match &parsed.result {
                Ok(statement) => assert!(
                    !should_fail,
                    "Statement {} unexpectedly parsed: {:?}",
                    parsed.index, statement
                ),
                Err(err) => assert!(
                    should_fail,
                    "Could not parse statement {} due to: {}",
                    parsed.index, err
                ),
            }
        }
    }
}

#[test]
fn test_empty_input() {
    assert!(parse_sql("").is_err());
    assert!(parse_sql("-- only a comment\n/* and another */").is_err());
    assert!(parse_sql("select 1").is_ok());
}

#[test]
fn test_statement_lines() {
    let sql = "select 1;\n\nselect\n 2;\ninsert into t values (1)";
    let lines = parse_statements(sql, Dialect::Ansi)
        .map(|parsed| parsed.line)
        .collect::<Vec<_>>();
    assert_eq!(lines, vec![1, 3, 5]);
}

#[test]
fn test_procedure_body_is_nested() {
    let sql = r#"
        CREATE OR REPLACE PROCEDURE etl.load_sales(p_day DATE)
        LANGUAGE plpgsql
        AS $$
        DECLARE
            v_rows INT;
        BEGIN
            INSERT INTO staging.sales SELECT * FROM raw.sales WHERE sale_day = p_day;
            IF v_rows > 0 THEN
                INSERT INTO fact_sales SELECT * FROM staging.sales;
            END IF;
        END;
        $$;
        CALL etl.load_sales(CURRENT_DATE);
    "#;
    let statements = parse_statements(sql, Dialect::Postgres).collect::<Vec<_>>();
    assert_eq!(statements.len(), 2);

    let Ok(Statement::CreateProcedure(procedure)) = &statements[0].result else {
        panic!("Expected create procedure statement");
    };
    assert_eq!(procedure.name.normalized(), "etl.load_sales");
    assert_eq!(procedure.parameters.len(), 1);
    assert_eq!(procedure.declarations, vec!["v_rows".to_owned()]);
    assert!(!procedure.body.is_empty());
    assert!(procedure.body.iter().all(|parsed| parsed.result.is_ok()));

    assert!(matches!(&statements[1].result, Ok(Statement::Call(_))));
}

#[test]
fn test_malformed_statement_is_isolated() {
    let sql = "select a from t; select from where; select b from u";
    let statements = parse_statements(sql, Dialect::Ansi).collect::<Vec<_>>();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].result.is_ok());
    assert!(statements[1].result.is_err());
    assert!(statements[2].result.is_ok());
}

#[test]
fn test_nesting_depth_limit() {
    let nested = |depth: usize| {
        format!(
            "SELECT {}a{} FROM t; SELECT b FROM u",
            "(".repeat(depth),
            ")".repeat(depth)
        )
    };

    let statements = parse_statements(&nested(10), Dialect::Ansi).collect::<Vec<_>>();
    assert!(statements.iter().all(|parsed| parsed.result.is_ok()));

    let statements = parse_statements(&nested(500), Dialect::Ansi).collect::<Vec<_>>();
    assert_eq!(statements.len(), 2);
    let Err(err) = &statements[0].result else {
        panic!("Expected deeply nested statement to fail");
    };
    assert!(err.message.contains("Maximum nesting depth exceeded"));
    assert!(statements[1].result.is_ok());
}
