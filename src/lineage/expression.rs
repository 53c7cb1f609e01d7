use crate::ast::{
    BinaryOperator, CaseExpr, Expr, FunctionArg, FunctionExpr, Ident, IsCheck, NamedWindow,
    NullsOrder, ObjectName, OrderByExpr, Query, SortDirection, UnaryOperator, WindowSpec,
};

/// Derivation of a column whose input could not be determined.
pub const UNRESOLVED: &str = "unresolved";

/// Name Postgres gives to an output column it cannot name.
const UNNAMED_COLUMN: &str = "?column?";

fn ident_text(ident: &Ident) -> String {
    if ident.quoted {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

fn join<T>(items: &[T], render: impl Fn(&T) -> String) -> String {
    items.iter().map(render).collect::<Vec<_>>().join(", ")
}

fn order_by_text(order_by: &OrderByExpr) -> String {
    let mut text = normalize(&order_by.expr);
    match order_by.direction {
        Some(SortDirection::Asc) => text.push_str(" ASC"),
        Some(SortDirection::Desc) => text.push_str(" DESC"),
        None => {}
    }
    match order_by.nulls {
        Some(NullsOrder::First) => text.push_str(" NULLS FIRST"),
        Some(NullsOrder::Last) => text.push_str(" NULLS LAST"),
        None => {}
    }
    text
}

fn window_text(window: &WindowSpec) -> String {
    let mut parts = vec![];
    if let Some(name) = &window.name {
        parts.push(ident_text(name));
    }
    if !window.partition_by.is_empty() {
        parts.push(format!("PARTITION BY {}", join(&window.partition_by, normalize)));
    }
    if !window.order_by.is_empty() {
        parts.push(format!("ORDER BY {}", join(&window.order_by, order_by_text)));
    }
    if let Some(frame) = &window.frame {
        parts.push(frame.clone());
    }

    match (&window.name, parts.len()) {
        (Some(name), 1) => ident_text(name),
        _ => format!("({})", parts.join(" ")),
    }
}

fn function_args_text(args: &[FunctionArg]) -> String {
    let mut text = String::new();
    for (i, arg) in args.iter().enumerate() {
        let keyword = arg.keyword.as_deref().map(|kw| kw.to_uppercase());
        let is_infix = matches!(keyword.as_deref(), Some("FROM" | "IN" | "FOR" | "AS"));
        if i > 0 {
            text.push_str(if is_infix { " " } else { ", " });
        }
        match (keyword, &arg.expr) {
            // TRIM(BOTH FROM x)
            (Some(keyword), Expr::Null) if !is_infix => text.push_str(&keyword),
            (Some(keyword), expr) => {
                text.push_str(&keyword);
                text.push(' ');
                text.push_str(&normalize(expr));
            }
            (None, expr) => text.push_str(&normalize(expr)),
        }
    }
    text
}

fn function_text(function: &FunctionExpr) -> String {
    let name = function
        .name
        .parts
        .iter()
        .map(|part| part.value.to_uppercase())
        .collect::<Vec<_>>()
        .join(".");
    if !function.parens {
        return name;
    }

    let mut text = format!("{}(", name);
    if function.distinct {
        text.push_str("DISTINCT ");
    }
    text.push_str(&function_args_text(&function.args));
    if !function.order_by.is_empty() {
        text.push_str(&format!(" ORDER BY {}", join(&function.order_by, order_by_text)));
    }
    if let Some(null_treatment) = &function.null_treatment {
        text.push(' ');
        text.push_str(&null_treatment.to_uppercase());
    }
    text.push(')');

    if !function.within_group.is_empty() {
        text.push_str(&format!(
            " WITHIN GROUP (ORDER BY {})",
            join(&function.within_group, order_by_text)
        ));
    }
    if let Some(filter) = &function.filter {
        text.push_str(&format!(" FILTER (WHERE {})", normalize(filter)));
    }
    if let Some(over) = &function.over {
        text.push_str(&format!(" OVER {}", window_text(over)));
    }
    text
}

fn case_text(case: &CaseExpr) -> String {
    let mut text = String::from("CASE");
    if let Some(operand) = &case.operand {
        text.push(' ');
        text.push_str(&normalize(operand));
    }
    for (when, then) in &case.when_thens {
        text.push_str(&format!(" WHEN {} THEN {}", normalize(when), normalize(then)));
    }
    if let Some(r#else) = &case.r#else {
        text.push_str(&format!(" ELSE {}", normalize(r#else)));
    }
    text.push_str(" END");
    text
}

fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

/// Canonical text of an expression, used as a column derivation and as a join
/// condition: keywords and function names upper-case, unquoted identifiers lower-case
/// without table qualifiers, single spaces, `x::t` as `CAST(x AS T)`.
pub fn normalize(expr: &Expr) -> String {
    match expr {
        Expr::Column(name) => name.last().map(ident_text).unwrap_or_default(),
        Expr::Variable(name) => name.clone(),
        Expr::String(value) => format!("'{}'", value.replace('\'', "''")),
        Expr::Number(value) => value.clone(),
        Expr::Bool(true) => "TRUE".to_owned(),
        Expr::Bool(false) => "FALSE".to_owned(),
        Expr::Null => "NULL".to_owned(),
        Expr::Star => "*".to_owned(),
        Expr::TypedString { data_type, value } => {
            format!("{} '{}'", data_type.to_uppercase(), value.replace('\'', "''"))
        }
        Expr::Interval { value, unit } => match unit {
            Some(unit) => format!("INTERVAL {} {}", normalize(value), unit.to_uppercase()),
            None => format!("INTERVAL {}", normalize(value)),
        },
        Expr::Binary(binary) => format!(
            "{} {} {}",
            normalize(&binary.left),
            binary.operator,
            normalize(&binary.right)
        ),
        Expr::Unary(unary) => match unary.operator {
            UnaryOperator::Not => format!("NOT {}", normalize(&unary.right)),
            operator => format!("{}{}", operator, normalize(&unary.right)),
        },
        Expr::Grouping(inner) => format!("({})", normalize(inner)),
        Expr::Tuple(items) => format!("({})", join(items, normalize)),
        Expr::Is {
            expr,
            negated,
            check,
        } => {
            let check = match check {
                IsCheck::Null => "NULL".to_owned(),
                IsCheck::True => "TRUE".to_owned(),
                IsCheck::False => "FALSE".to_owned(),
                IsCheck::DistinctFrom(other) => format!("DISTINCT FROM {}", normalize(other)),
            };
            format!("{} IS {}{}", normalize(expr), not(*negated), check)
        }
        Expr::InList {
            expr,
            negated,
            list,
        } => format!("{} {}IN ({})", normalize(expr), not(*negated), join(list, normalize)),
        Expr::InSubquery { expr, negated, .. } => {
            format!("{} {}IN (SELECT ...)", normalize(expr), not(*negated))
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            normalize(expr),
            not(*negated),
            normalize(low),
            normalize(high)
        ),
        Expr::Like {
            expr,
            negated,
            case_insensitive,
            pattern,
            escape,
        } => {
            let mut text = format!(
                "{} {}{} {}",
                normalize(expr),
                not(*negated),
                if *case_insensitive { "ILIKE" } else { "LIKE" },
                normalize(pattern)
            );
            if let Some(escape) = escape {
                text.push_str(&format!(" ESCAPE {}", normalize(escape)));
            }
            text
        }
        Expr::Exists { negated, .. } => format!("{}EXISTS (SELECT ...)", not(*negated)),
        Expr::Subquery(_) => "(SELECT ...)".to_owned(),
        Expr::Case(case) => case_text(case),
        Expr::Cast(cast) => format!(
            "{}({} AS {})",
            cast.kind,
            normalize(&cast.expr),
            cast.data_type.to_uppercase()
        ),
        Expr::Extract { field, expr } => {
            format!("EXTRACT({} FROM {})", field.to_uppercase(), normalize(expr))
        }
        Expr::Function(function) => function_text(function),
    }
}

/// Output name of a select item without an alias.
pub fn unnamed_column_name(expr: &Expr) -> String {
    match expr {
        Expr::Column(name) => name
            .last()
            .map(|ident| ident.normalized())
            .unwrap_or_else(|| UNNAMED_COLUMN.to_owned()),
        Expr::Function(function) => function.lower_name(),
        Expr::Cast(cast) => unnamed_column_name(&cast.expr),
        Expr::Grouping(inner) => unnamed_column_name(inner),
        Expr::Case(_) => "case".to_owned(),
        _ => UNNAMED_COLUMN.to_owned(),
    }
}

/// Partitioning and ordering of a `ROW_NUMBER()` window, as normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowNumberWindow {
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
}

/// Recognizes `ROW_NUMBER() OVER (...)`, following `OVER w` references into the
/// select's `WINDOW` clause.
pub fn row_number_window(expr: &Expr, windows: &[NamedWindow]) -> Option<RowNumberWindow> {
    let Expr::Function(function) = expr else {
        return None;
    };
    if function.lower_name() != "row_number" {
        return None;
    }
    let over = function.over.as_ref()?;

    let mut partition_by = over.partition_by.iter().map(normalize).collect::<Vec<_>>();
    let mut order_by = over.order_by.iter().map(order_by_text).collect::<Vec<_>>();
    if let Some(name) = &over.name {
        let named = windows
            .iter()
            .find(|window| window.name.normalized() == name.normalized());
        if let Some(named) = named {
            if partition_by.is_empty() {
                partition_by = named.spec.partition_by.iter().map(normalize).collect();
            }
            if order_by.is_empty() {
                order_by = named.spec.order_by.iter().map(order_by_text).collect();
            }
        }
    }

    Some(RowNumberWindow {
        partition_by,
        order_by,
    })
}

/// Splits `a AND b AND c` into its conjuncts.
pub fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Binary(binary) if binary.operator == BinaryOperator::And => {
            let mut parts = conjuncts(&binary.left);
            parts.extend(conjuncts(&binary.right));
            parts
        }
        Expr::Grouping(inner) if matches!(**inner, Expr::Binary(_)) => conjuncts(inner),
        _ => vec![expr],
    }
}

fn is_one(expr: &Expr) -> bool {
    matches!(expr, Expr::Number(value) if value == "1")
}

/// Operand compared with the literal `1` in `x = 1` or `1 = x`.
pub fn first_row_filter_operand(expr: &Expr) -> Option<&Expr> {
    let Expr::Binary(binary) = expr else {
        return None;
    };
    if binary.operator != BinaryOperator::Equal {
        return None;
    }
    if is_one(&binary.right) {
        Some(&binary.left)
    } else if is_one(&binary.left) {
        Some(&binary.right)
    } else {
        None
    }
}

/// True when any column reference in `expr` is named `column`.
pub fn mentions_column(expr: &Expr, column: &str) -> bool {
    let mut found = false;
    visit_columns(expr, &mut |name| {
        if name.last().is_some_and(|ident| ident.normalized() == column) {
            found = true;
        }
    });
    found
}

/// Calls `f` for each column reference of `expr`, without descending into subqueries.
pub fn visit_columns<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e ObjectName)) {
    match expr {
        Expr::Column(name) => f(name),
        Expr::Variable(_)
        | Expr::String(_)
        | Expr::Number(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Star
        | Expr::TypedString { .. }
        | Expr::Exists { .. }
        | Expr::Subquery(_) => {}
        Expr::Interval { value, .. } => visit_columns(value, f),
        Expr::Binary(binary) => {
            visit_columns(&binary.left, f);
            visit_columns(&binary.right, f);
        }
        Expr::Unary(unary) => visit_columns(&unary.right, f),
        Expr::Grouping(inner) => visit_columns(inner, f),
        Expr::Tuple(items) => items.iter().for_each(|item| visit_columns(item, f)),
        Expr::Is { expr, check, .. } => {
            visit_columns(expr, f);
            if let IsCheck::DistinctFrom(other) = check {
                visit_columns(other, f);
            }
        }
        Expr::InList { expr, list, .. } => {
            visit_columns(expr, f);
            list.iter().for_each(|item| visit_columns(item, f));
        }
        Expr::InSubquery { expr, .. } => visit_columns(expr, f),
        Expr::Between {
            expr, low, high, ..
        } => {
            visit_columns(expr, f);
            visit_columns(low, f);
            visit_columns(high, f);
        }
        Expr::Like {
            expr,
            pattern,
            escape,
            ..
        } => {
            visit_columns(expr, f);
            visit_columns(pattern, f);
            if let Some(escape) = escape {
                visit_columns(escape, f);
            }
        }
        Expr::Case(case) => {
            if let Some(operand) = &case.operand {
                visit_columns(operand, f);
            }
            for (when, then) in &case.when_thens {
                visit_columns(when, f);
                visit_columns(then, f);
            }
            if let Some(r#else) = &case.r#else {
                visit_columns(r#else, f);
            }
        }
        Expr::Cast(cast) => visit_columns(&cast.expr, f),
        Expr::Extract { expr, .. } => visit_columns(expr, f),
        Expr::Function(function) => {
            function
                .args
                .iter()
                .for_each(|arg| visit_columns(&arg.expr, f));
            function
                .order_by
                .iter()
                .chain(function.within_group.iter())
                .for_each(|order_by| visit_columns(&order_by.expr, f));
            if let Some(filter) = &function.filter {
                visit_columns(filter, f);
            }
            if let Some(over) = &function.over {
                over.partition_by
                    .iter()
                    .for_each(|expr| visit_columns(expr, f));
                over.order_by
                    .iter()
                    .for_each(|order_by| visit_columns(&order_by.expr, f));
            }
        }
    }
}

/// Calls `f` for each subquery directly nested in `expr`.
pub fn visit_subqueries<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e Query)) {
    match expr {
        Expr::Subquery(query) | Expr::Exists { query, .. } => f(query.as_ref()),
        Expr::InSubquery { expr, query, .. } => {
            visit_subqueries(expr, f);
            f(query.as_ref());
        }
        Expr::Column(_)
        | Expr::Variable(_)
        | Expr::String(_)
        | Expr::Number(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Star
        | Expr::TypedString { .. } => {}
        Expr::Interval { value, .. } => visit_subqueries(value, f),
        Expr::Binary(binary) => {
            visit_subqueries(&binary.left, f);
            visit_subqueries(&binary.right, f);
        }
        Expr::Unary(unary) => visit_subqueries(&unary.right, f),
        Expr::Grouping(inner) => visit_subqueries(inner, f),
        Expr::Tuple(items) => items.iter().for_each(|item| visit_subqueries(item, f)),
        Expr::Is { expr, check, .. } => {
            visit_subqueries(expr, f);
            if let IsCheck::DistinctFrom(other) = check {
                visit_subqueries(other, f);
            }
        }
        Expr::InList { expr, list, .. } => {
            visit_subqueries(expr, f);
            list.iter().for_each(|item| visit_subqueries(item, f));
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            visit_subqueries(expr, f);
            visit_subqueries(low, f);
            visit_subqueries(high, f);
        }
        Expr::Like { expr, pattern, .. } => {
            visit_subqueries(expr, f);
            visit_subqueries(pattern, f);
        }
        Expr::Case(case) => {
            if let Some(operand) = &case.operand {
                visit_subqueries(operand, f);
            }
            for (when, then) in &case.when_thens {
                visit_subqueries(when, f);
                visit_subqueries(then, f);
            }
            if let Some(r#else) = &case.r#else {
                visit_subqueries(r#else, f);
            }
        }
        Expr::Cast(cast) => visit_subqueries(&cast.expr, f),
        Expr::Extract { expr, .. } => visit_subqueries(expr, f),
        Expr::Function(function) => {
            function
                .args
                .iter()
                .for_each(|arg| visit_subqueries(&arg.expr, f));
            if let Some(filter) = &function.filter {
                visit_subqueries(filter, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{SelectItem, SetExpr, Statement},
        dialect::Dialect,
        parser::parse_statements,
    };

    fn projection(sql: &str) -> Vec<Expr> {
        let statement = parse_statements(sql, Dialect::Postgres)
            .next()
            .unwrap()
            .result
            .unwrap();
        let Statement::Query(query) = statement else {
            panic!("expected a query");
        };
        let SetExpr::Select(select) = query.query.body else {
            panic!("expected a select");
        };
        select
            .projection
            .into_iter()
            .map(|item| match item {
                SelectItem::Expr { expr, .. } => expr,
                _ => panic!("expected an expression"),
            })
            .collect()
    }

    #[test]
    fn normalizes_expressions() {
        let exprs = projection(
            "select upper(trim(C.First_Name)), concat(first_name, ' ', last_name), \
             amount::numeric(10,2), sum(x) over (partition by a order by b desc), \
             substring(code from 1 for 3), current_date, \
             case when status = 'A' then 1 else 0 end from t",
        );
        let texts = exprs.iter().map(normalize).collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                "UPPER(TRIM(first_name))",
                "CONCAT(first_name, ' ', last_name)",
                "CAST(amount AS NUMERIC(10,2))",
                "SUM(x) OVER (PARTITION BY a ORDER BY b DESC)",
                "SUBSTRING(code FROM 1 FOR 3)",
                "CURRENT_DATE",
                "CASE WHEN status = 'A' THEN 1 ELSE 0 END",
            ]
        );
    }

    #[test]
    fn names_unnamed_columns() {
        let exprs = projection("select t.id, count(*), cast(x as int), 1 + 2 from t");
        let names = exprs.iter().map(unnamed_column_name).collect::<Vec<_>>();
        assert_eq!(names, vec!["id", "count", "x", "?column?"]);
    }

    #[test]
    fn recognizes_row_number_windows() {
        let exprs = projection(
            "select row_number() over (partition by customer_id order by updated_at desc), \
             rank() over (order by x) from t",
        );
        assert_eq!(
            row_number_window(&exprs[0], &[]),
            Some(RowNumberWindow {
                partition_by: vec!["customer_id".to_owned()],
                order_by: vec!["updated_at DESC".to_owned()],
            })
        );
        assert_eq!(row_number_window(&exprs[1], &[]), None);
    }
}
