use std::collections::HashSet;

use sqlflow::{
    config::AnalyzerConfig,
    dialect::Dialect,
    lineage::{
        analyze,
        catalog::Catalog,
        diagnostics::Warning,
        graph::{ColumnMapping, merge_parallel_edges},
    },
    test_utils::{LINEAGE_TESTS_FILE, TestColumnMapping, TestLineageData},
};

fn postgres() -> AnalyzerConfig {
    AnalyzerConfig {
        dialect: Dialect::Postgres,
        ..Default::default()
    }
}

fn warning_kind(warning: &Warning) -> String {
    serde_json::to_value(warning).unwrap()["kind"]
        .as_str()
        .unwrap()
        .to_owned()
}

#[test]
fn test_lineage() {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    for test in test_lineage_data.tests {
        println!("Testing lineage for `{}`: {}", &test.name, &test.sql);
        let config = AnalyzerConfig {
            dialect: test.dialect,
            parallel: false,
            catalog: Catalog {
                schema_objects: test.schema_objects,
            },
        };
        let analysis = analyze(&test.sql, &config)
            .unwrap_or_else(|err| panic!("Could not analyze sql due to: {}", err));
        let graph = &analysis.graph;

        let edges = graph
            .edges()
            .iter()
            .map(|edge| {
                (
                    edge.source_node.as_str(),
                    edge.target_node.as_str(),
                    edge.operation.to_string(),
                )
            })
            .collect::<HashSet<_>>();
        let expected_edges = test
            .edges
            .iter()
            .map(|edge| {
                (
                    edge.source.as_str(),
                    edge.target.as_str(),
                    edge.operation.clone(),
                )
            })
            .collect::<HashSet<_>>();
        assert_eq!(edges, expected_edges, "edges of `{}`", test.name);

        for expected in &test.edges {
            let edge = graph
                .edges_from(&expected.source)
                .find(|edge| edge.target_node == expected.target)
                .unwrap();
            for (column, mapping) in &expected.columns {
                let ColumnMapping {
                    sources,
                    derivation,
                } = edge.column_map.get(column).unwrap_or_else(|| {
                    panic!(
                        "Missing column `{}` in edge {} -> {} of `{}`",
                        column, expected.source, expected.target, test.name
                    )
                });
                assert_eq!(
                    &TestColumnMapping {
                        sources: sources.clone(),
                        derivation: derivation.clone(),
                    },
                    mapping,
                    "column `{}` of edge {} -> {} in `{}`",
                    column,
                    expected.source,
                    expected.target,
                    test.name
                );
            }
        }

        for expected in &test.nodes {
            let node = graph
                .node(&expected.name)
                .unwrap_or_else(|| panic!("Missing node `{}` in `{}`", expected.name, test.name));
            assert_eq!(node.kind.to_string(), expected.kind, "kind of `{}`", node.name);
        }

        let warnings = analysis.warnings.iter().map(warning_kind).collect::<Vec<_>>();
        assert_eq!(warnings, test.warnings, "warnings of `{}`", test.name);
    }
}

const CUSTOMER_PIPELINE: &str = r#"
WITH extracted_customers AS (
    SELECT customer_id, first_name, last_name, email, updated_at
    FROM source_db.customers
),
cleaned_customers AS (
    SELECT
        customer_id,
        UPPER(TRIM(first_name)) AS first_name,
        UPPER(TRIM(last_name)) AS last_name,
        LOWER(email) AS email,
        updated_at
    FROM extracted_customers
    WHERE email IS NOT NULL
),
deduplicated_customers AS (
    SELECT customer_id, first_name, last_name, email
    FROM (
        SELECT *, ROW_NUMBER() OVER (PARTITION BY customer_id ORDER BY updated_at DESC) AS rn
        FROM cleaned_customers
    ) ranked
    WHERE rn = 1
)
INSERT INTO warehouse.customer_orders (customer_id, customer_name, email, order_count, total_amount)
SELECT
    c.customer_id,
    CONCAT(c.first_name, ' ', c.last_name) AS customer_name,
    c.email,
    COUNT(o.order_id),
    SUM(o.amount)
FROM deduplicated_customers c
LEFT JOIN staging.orders o ON c.customer_id = o.customer_id
GROUP BY c.customer_id, c.first_name, c.last_name, c.email;
"#;

#[test]
fn test_customer_pipeline() {
    let analysis = analyze(CUSTOMER_PIPELINE, &postgres()).unwrap();
    let graph = &analysis.graph;
    assert!(analysis.warnings.is_empty(), "{:?}", analysis.warnings);

    let operations = |operation: &str| {
        graph
            .edges()
            .iter()
            .filter(|edge| edge.operation.to_string() == operation)
            .map(|edge| (edge.source_node.as_str(), edge.target_node.as_str()))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        operations("EXTRACT"),
        vec![("source_db.customers", "extracted_customers")]
    );
    assert_eq!(
        operations("TRANSFORM"),
        vec![
            ("extracted_customers", "cleaned_customers"),
            ("cleaned_customers", "deduplicated_customers"),
            ("staging.orders", "warehouse.customer_orders"),
        ]
    );
    assert_eq!(
        operations("LOAD"),
        vec![("deduplicated_customers", "warehouse.customer_orders")]
    );

    let load = graph
        .edges_into("warehouse.customer_orders")
        .find(|edge| edge.source_node == "deduplicated_customers")
        .unwrap();
    assert_eq!(
        load.column_map["customer_name"],
        ColumnMapping {
            sources: vec!["first_name".to_owned(), "last_name".to_owned()],
            derivation: Some("CONCAT(first_name, ' ', last_name)".to_owned()),
        }
    );
    assert_eq!(load.column_map["customer_id"].derivation, None);

    let orders = graph
        .edges_into("warehouse.customer_orders")
        .find(|edge| edge.source_node == "staging.orders")
        .unwrap();
    assert_eq!(
        orders.column_map["total_amount"].derivation.as_deref(),
        Some("SUM(amount)")
    );
    assert_eq!(orders.conditions, vec!["customer_id = customer_id"]);

    let deduplicated = graph.node("deduplicated_customers").unwrap();
    assert_eq!(deduplicated.kind.to_string(), "transform");
    assert_eq!(
        deduplicated
            .columns
            .iter()
            .map(|col| col.name.as_str())
            .collect::<Vec<_>>(),
        vec!["customer_id", "first_name", "last_name", "email"]
    );
    assert_eq!(graph.node("staging.orders").unwrap().kind.to_string(), "staging");
    assert_eq!(
        graph.node("warehouse.customer_orders").unwrap().kind.to_string(),
        "warehouse"
    );

    let statement = graph.statements().next().unwrap();
    assert_eq!(statement.deduplications.len(), 1);
    assert_eq!(statement.deduplications[0].input, "cleaned_customers");
    assert_eq!(statement.deduplications[0].output, "deduplicated_customers");
}

#[test]
fn test_cte_scope_has_no_forward_references() {
    let analysis = analyze(CUSTOMER_PIPELINE, &postgres()).unwrap();
    let statement = analysis.graph.statements().next().unwrap();
    let ctes = [
        "extracted_customers",
        "cleaned_customers",
        "deduplicated_customers",
    ];
    for table in &statement.tables {
        if let Some(position) = ctes.iter().position(|cte| *cte == table.object) {
            assert_eq!(table.binding.to_string(), "cte");
            // every reference to a CTE comes from a later CTE or the final query
            let reader = analysis
                .graph
                .edges_from(&table.object)
                .map(|edge| edge.target_node.clone())
                .collect::<Vec<_>>();
            for target in reader {
                if let Some(target_position) = ctes.iter().position(|cte| *cte == target) {
                    assert!(target_position > position);
                }
            }
        }
    }
}

#[test]
fn test_extraction_is_deterministic() {
    let first = analyze(CUSTOMER_PIPELINE, &postgres()).unwrap();
    let second = analyze(CUSTOMER_PIPELINE, &postgres()).unwrap();
    let parallel = analyze(
        CUSTOMER_PIPELINE,
        &AnalyzerConfig {
            parallel: true,
            ..postgres()
        },
    )
    .unwrap();
    let first = serde_json::to_string(&first).unwrap();
    assert_eq!(first, serde_json::to_string(&second).unwrap());
    assert_eq!(first, serde_json::to_string(&parallel).unwrap());
}

#[test]
fn test_merging_edges_is_idempotent() {
    let analysis = analyze(CUSTOMER_PIPELINE, &postgres()).unwrap();
    let edges = analysis.graph.edges().to_vec();

    let doubled = edges.iter().chain(edges.iter()).cloned().collect::<Vec<_>>();
    let (merged, warnings) = merge_parallel_edges(doubled);
    assert_eq!(merged, edges);
    assert!(warnings.is_empty());
}

#[test]
fn test_merge_into_dim_store() {
    let sql = "
        MERGE INTO dim_store d
        USING staging.stores s ON d.store_id = s.store_id
        WHEN MATCHED THEN UPDATE SET store_name = s.store_name
        WHEN NOT MATCHED THEN INSERT (store_id, store_name) VALUES (s.store_id, s.store_name);
    ";
    let analysis = analyze(sql, &postgres()).unwrap();
    let edges = analysis.graph.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].operation.to_string(), "MERGE");
    assert_eq!(analysis.graph.node("DIM_STORE").unwrap().kind.to_string(), "dimension");
}

#[test]
fn test_partial_failure_isolation() {
    let sql = "
        INSERT INTO fact_a SELECT x FROM src.a;
        INSERT INTO WHERE SELECT;
        INSERT INTO fact_b SELECT y FROM src.b;
    ";
    let analysis = analyze(sql, &AnalyzerConfig::default()).unwrap();
    let targets = analysis
        .graph
        .edges()
        .iter()
        .map(|edge| edge.target_node.as_str())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec!["fact_a", "fact_b"]);
    assert!(matches!(analysis.warnings[..], [Warning::Syntax { statement: 1, .. }]));

    let failed = analysis.graph.statements().nth(1).unwrap();
    assert_eq!(failed.kind.to_string(), "invalid");
    assert!(failed.error.is_some());
}

#[test]
fn test_unclosed_parenthesis_is_isolated() {
    let sql = "
        INSERT INTO t SELECT a FROM s WHERE broken ((;
        INSERT INTO fact_t2 SELECT b FROM stg_s2;
    ";
    let analysis = analyze(sql, &AnalyzerConfig::default()).unwrap();
    let edges = analysis
        .graph
        .edges()
        .iter()
        .map(|edge| (edge.source_node.as_str(), edge.target_node.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(edges, vec![("stg_s2", "fact_t2")]);
    assert!(matches!(analysis.warnings[..], [Warning::Syntax { statement: 0, .. }]));
}

#[test]
fn test_deep_nesting_is_a_syntax_error() {
    let depth = 300;
    let sql = format!(
        "INSERT INTO t SELECT {}a{} FROM s; INSERT INTO u SELECT b FROM v;",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    let targets = analysis
        .graph
        .edges()
        .iter()
        .map(|edge| edge.target_node.as_str())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec!["u"]);
    let [Warning::Syntax { message, .. }] = &analysis.warnings[..] else {
        panic!("Expected a single syntax warning, got {:?}", analysis.warnings);
    };
    assert!(message.contains("Maximum nesting depth exceeded"));
}

#[test]
fn test_scalar_subquery_columns_bind_to_inner_relation() {
    let sql = "
        WITH c AS (SELECT id, amt FROM src.a)
        INSERT INTO fact_x SELECT id, (SELECT MAX(amt) FROM raw.b) AS mx FROM c;
    ";
    let analysis = analyze(sql, &AnalyzerConfig::default()).unwrap();
    let graph = &analysis.graph;

    let load = graph.edges_from("c").find(|edge| edge.target_node == "fact_x").unwrap();
    assert_eq!(load.operation.to_string(), "LOAD");
    assert!(load.column_map.contains_key("id"));
    assert!(!load.column_map.contains_key("mx"));

    let subquery = graph
        .edges_from("raw.b")
        .find(|edge| edge.target_node == "fact_x")
        .unwrap();
    assert_eq!(subquery.operation.to_string(), "TRANSFORM");
    assert_eq!(subquery.column_map["mx"].sources, vec!["amt".to_owned()]);
}

#[test]
fn test_star_warns_once_per_occurrence() {
    let sql = "
        CREATE TABLE stg_a AS SELECT * FROM raw.a JOIN raw.b ON a.id = b.id;
        CREATE TABLE stg_c AS SELECT c.*, d.* FROM raw.c c JOIN raw.d d ON c.id = d.id;
    ";
    let analysis = analyze(sql, &AnalyzerConfig::default()).unwrap();
    let star_warnings = analysis
        .warnings
        .iter()
        .filter(|warning| {
            matches!(warning, Warning::UnresolvedColumn { column, .. } if column == "*")
        })
        .count();
    assert_eq!(star_warnings, 3);

    let node = analysis.graph.node("stg_a").unwrap();
    assert_eq!(node.columns.len(), 1);
    assert_eq!(node.columns[0].name, "*");
    assert_eq!(node.columns[0].derivation.as_deref(), Some("unresolved"));
}

#[test]
fn test_procedure_owns_its_statements() {
    let sql = r#"
        CREATE OR REPLACE PROCEDURE etl.refresh_sales()
        LANGUAGE plpgsql
        AS $$
        BEGIN
            INSERT INTO stg_sales SELECT sale_id, amount FROM raw.sales;
            INSERT INTO fact_sales SELECT sale_id, amount FROM stg_sales;
        END;
        $$;
        CALL etl.refresh_sales();
    "#;
    let analysis = analyze(sql, &postgres()).unwrap();
    let graph = &analysis.graph;

    assert_eq!(graph.procedures().collect::<Vec<_>>(), vec!["etl.refresh_sales"]);
    let body = graph.procedure_statements("etl.refresh_sales");
    assert_eq!(body.len(), 2);
    assert!(body
        .iter()
        .all(|statement| statement.procedure.as_deref() == Some("etl.refresh_sales")));
    assert_eq!(body[1].targets, vec!["fact_sales"]);

    assert_eq!(
        graph.node("etl.refresh_sales").unwrap().kind.to_string(),
        "procedure"
    );
    let operations = graph
        .edges()
        .iter()
        .map(|edge| edge.operation.to_string())
        .collect::<Vec<_>>();
    assert_eq!(operations, vec!["EXTRACT", "LOAD"]);
}
