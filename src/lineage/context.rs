use indexmap::{IndexMap, IndexSet};

use crate::ast::{
    Cte, FromExpr, InsertSource, MergeSource, ObjectName, ParsedStatement, Query, SelectItem,
    SetExpr, Statement,
};

use super::{catalog::Catalog, classify::is_staging_name, expression::unnamed_column_name};

/// Run-scoped facts gathered from every statement before extraction starts, so that
/// statements can be extracted independently (and in parallel) while still knowing
/// about objects created elsewhere in the same run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cte_names: IndexSet<String>,
    write_targets: IndexSet<String>,
    known_columns: IndexMap<String, Vec<String>>,
    variables: IndexSet<String>,
    temporaries: IndexSet<String>,
    views: IndexSet<String>,
    procedures: IndexSet<String>,
}

/// Output names of a query whose projection has no wildcard.
pub(crate) fn projection_names(query: &Query) -> Option<Vec<String>> {
    let mut body = &query.body;
    loop {
        match body {
            SetExpr::Select(select) => {
                return select
                    .projection
                    .iter()
                    .map(|item| match item {
                        SelectItem::Expr { expr, alias } => Some(
                            alias
                                .as_ref()
                                .map(|alias| alias.normalized())
                                .unwrap_or_else(|| unnamed_column_name(expr)),
                        ),
                        _ => None,
                    })
                    .collect();
            }
            SetExpr::Query(query) => body = &query.body,
            SetExpr::SetOperation { left, .. } => body = left,
            SetExpr::Values(rows) => {
                let width = rows.first().map(|row| row.len())?;
                return Some((1..=width).map(|i| format!("column{}", i)).collect());
            }
        }
    }
}

impl RunContext {
    pub fn build(statements: &[ParsedStatement], catalog: &Catalog) -> Self {
        let mut ctx = RunContext {
            known_columns: catalog.column_map(),
            ..Default::default()
        };
        ctx.collect(statements);
        log::debug!(
            "Run context: {} ctes, {} write targets, {} variables",
            ctx.cte_names.len(),
            ctx.write_targets.len(),
            ctx.variables.len()
        );
        ctx
    }

    fn collect(&mut self, statements: &[ParsedStatement]) {
        for statement in statements.iter().filter_map(|parsed| parsed.statement()) {
            self.collect_statement(statement);
        }
    }

    fn add_target(&mut self, name: &ObjectName) -> String {
        let name = name.normalized();
        if name.starts_with('#') {
            self.temporaries.insert(name.clone());
        }
        self.write_targets.insert(name.clone());
        name
    }

    fn add_columns(&mut self, name: &str, columns: Vec<String>) {
        if !columns.is_empty() {
            self.known_columns.entry(name.to_owned()).or_insert(columns);
        }
    }

    fn collect_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query_statement) => {
                self.collect_query(&query_statement.query);
                if let SetExpr::Select(select) = &query_statement.query.body {
                    if let Some(into) = &select.into {
                        for target in &into.targets {
                            if self.is_variable(&target.normalized()) {
                                continue;
                            }
                            let name = self.add_target(target);
                            if into.temporary {
                                self.temporaries.insert(name.clone());
                            }
                            if let Some(columns) = projection_names(&query_statement.query) {
                                self.add_columns(&name, columns);
                            }
                        }
                    }
                }
            }
            Statement::Insert(insert) => {
                if let Some(with) = &insert.with {
                    with.ctes.iter().for_each(|cte| self.collect_cte(cte));
                }
                if let InsertSource::Query(query) = &insert.source {
                    self.collect_query(query);
                }
                self.add_target(&insert.table);
            }
            Statement::Update(update) => {
                if let Some(with) = &update.with {
                    with.ctes.iter().for_each(|cte| self.collect_cte(cte));
                }
                if let Some(from) = &update.from {
                    self.collect_from(from);
                }
                self.add_target(&update.table);
            }
            Statement::Merge(merge) => {
                if let Some(with) = &merge.with {
                    with.ctes.iter().for_each(|cte| self.collect_cte(cte));
                }
                if let MergeSource::Subquery(query) = &merge.source {
                    self.collect_query(query);
                }
                self.add_target(&merge.target);
            }
            Statement::CreateTable(create) => {
                let name = self.add_target(&create.name);
                if create.temporary {
                    self.temporaries.insert(name.clone());
                }
                let mut columns = create
                    .columns
                    .iter()
                    .map(|column| column.name.normalized())
                    .collect::<Vec<_>>();
                if let Some(query) = &create.query {
                    self.collect_query(query);
                    if columns.is_empty() {
                        columns = projection_names(query).unwrap_or_default();
                    }
                }
                self.add_columns(&name, columns);
            }
            Statement::CreateView(create) => {
                let name = self.add_target(&create.name);
                if !create.materialized {
                    self.views.insert(name.clone());
                }
                if create.temporary {
                    self.temporaries.insert(name.clone());
                }
                self.collect_query(&create.query);
                let columns = if create.columns.is_empty() {
                    projection_names(&create.query).unwrap_or_default()
                } else {
                    create.columns.iter().map(|col| col.normalized()).collect()
                };
                self.add_columns(&name, columns);
            }
            Statement::CreateProcedure(create) => {
                self.procedures.insert(create.name.normalized());
                self.collect(&create.body);
            }
            Statement::Call(call) => {
                self.procedures.insert(call.procedure.normalized());
            }
            Statement::Block(block) => {
                self.collect(&block.statements);
                self.collect(&block.exception_statements);
            }
            Statement::If(if_statement) => {
                for branch in &if_statement.branches {
                    self.collect(&branch.statements);
                }
                self.collect(&if_statement.r#else);
            }
            Statement::DeclareVar(declare) => {
                self.variables.extend(declare.names.iter().cloned());
            }
            Statement::SetVar(set) => {
                self.variables.insert(set.name.clone());
            }
            Statement::Delete(_)
            | Statement::Drop(_)
            | Statement::Truncate(_)
            | Statement::Unsupported(_) => {}
        }
    }

    fn collect_cte(&mut self, cte: &Cte) {
        self.cte_names.insert(cte.name.normalized());
        self.collect_query(&cte.query);
    }

    fn collect_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            with.ctes.iter().for_each(|cte| self.collect_cte(cte));
        }
        self.collect_set_expr(&query.body);
    }

    fn collect_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                if let Some(from) = &select.from {
                    self.collect_from(from);
                }
            }
            SetExpr::Query(query) => self.collect_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_set_expr(left);
                self.collect_set_expr(right);
            }
            SetExpr::Values(_) => {}
        }
    }

    fn collect_from(&mut self, from: &FromExpr) {
        match from {
            FromExpr::Derived(derived) => self.collect_query(&derived.query),
            FromExpr::Join(join) => {
                self.collect_from(&join.left);
                self.collect_from(&join.right);
            }
            FromExpr::Grouping(inner) => self.collect_from(inner),
            FromExpr::Table(_) | FromExpr::Function(_) => {}
        }
    }

    /// A CTE name anywhere in the run, a write target of any statement or a
    /// staging-named object.
    pub fn is_defined_in_run(&self, name: &str) -> bool {
        self.cte_names.contains(name) || self.write_targets.contains(name) || is_staging_name(name)
    }

    pub fn is_cte_name(&self, name: &str) -> bool {
        self.cte_names.contains(name)
    }

    /// Known columns of an object: exact name first, then a unique match on the last
    /// name segment (`customers` for `src.customers` and vice versa).
    pub fn columns_of(&self, name: &str) -> Option<&[String]> {
        if let Some(columns) = self.known_columns.get(name) {
            return Some(columns.as_slice());
        }
        let last = name.rsplit('.').next().unwrap_or(name);
        let mut candidates = self.known_columns.iter().filter(|(known, _)| {
            (!name.contains('.') || !known.contains('.'))
                && known.rsplit('.').next().unwrap_or(known) == last
        });
        match (candidates.next(), candidates.next()) {
            (Some((_, columns)), None) => Some(columns.as_slice()),
            _ => None,
        }
    }

    pub fn is_variable(&self, name: &str) -> bool {
        name.starts_with('@') || name.starts_with(':') || self.variables.contains(name)
    }

    pub fn is_temporary(&self, name: &str) -> bool {
        name.starts_with('#') || self.temporaries.contains(name)
    }

    pub fn is_view(&self, name: &str) -> bool {
        self.views.contains(name)
    }

    pub fn is_procedure(&self, name: &str) -> bool {
        self.procedures.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dialect::Dialect, parser::parse_statements};

    fn build(sql: &str) -> RunContext {
        let statements = parse_statements(sql, Dialect::Ansi).collect::<Vec<_>>();
        RunContext::build(&statements, &Catalog::default())
    }

    #[test]
    fn collects_run_objects() {
        let ctx = build(
            "DECLARE @batch_id INT;
             CREATE TEMP TABLE tmp_orders (order_id INT, amount DECIMAL(10,2));
             WITH a AS (SELECT 1 AS x) INSERT INTO mart.totals SELECT x FROM a;
             CREATE VIEW v_orders AS SELECT order_id, amount * 2 AS doubled FROM tmp_orders;",
        );
        assert!(ctx.is_variable("@batch_id"));
        assert!(ctx.is_temporary("tmp_orders"));
        assert!(ctx.is_view("v_orders"));
        assert!(ctx.is_defined_in_run("a"));
        assert!(ctx.is_defined_in_run("mart.totals"));
        assert!(ctx.is_defined_in_run("staging.orders"));
        assert!(!ctx.is_defined_in_run("source_db.customers"));
        assert_eq!(
            ctx.columns_of("tmp_orders"),
            Some(&["order_id".to_owned(), "amount".to_owned()][..])
        );
        assert_eq!(
            ctx.columns_of("v_orders"),
            Some(&["order_id".to_owned(), "doubled".to_owned()][..])
        );
    }

    #[test]
    fn matches_columns_on_last_segment() {
        let catalog = Catalog::from_json_str(
            r#"{"schema_objects": [
                {"name": "src.customers", "kind": {"table": {"columns": [{"name": "id"}]}}}
            ]}"#,
        )
        .unwrap();
        let ctx = RunContext::build(&[], &catalog);
        assert!(ctx.columns_of("customers").is_some());
        assert!(ctx.columns_of("other.orders").is_none());
    }
}
