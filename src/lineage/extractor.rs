use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::ast::{
    CallStatement, CreateProcedureStatement, CreateTableStatement, CreateViewStatement, Cte,
    DeleteStatement, Expr, FromExpr, Ident, InsertSource, InsertStatement, JoinConstraint,
    MergeAction, MergeSource, MergeStatement, ObjectName, OnConflict, OnConflictAction,
    ParsedStatement, Query, QueryStatement, Select, SelectItem, SetExpr, Statement,
    UpdateStatement, With,
};

use super::{
    classify::{Flow, NodeKind, NodeRole, ReadKind, WriteKind, node_kind},
    context::RunContext,
    diagnostics::Warning,
    expression::{
        RowNumberWindow, conjuncts, first_row_filter_operand, mentions_column, normalize,
        row_number_window, unnamed_column_name, visit_columns, visit_subqueries,
    },
    graph::{ColumnDescriptor, ColumnMapping, Edge},
    scope::{
        Binding, BindingKind, ColumnLineage, ColumnOrigin, OutputColumn, Relation, Resolution,
        Scope, TableBinding,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatementKind {
    Query,
    Insert,
    Update,
    Delete,
    Merge,
    CreateTable,
    CreateView,
    CreateProcedure,
    Call,
    Block,
    If,
    DeclareVar,
    SetVar,
    Drop,
    Truncate,
    Unsupported,
    /// The statement could not be parsed.
    Invalid,
}

impl StatementKind {
    fn of(statement: &Statement) -> Self {
        match statement {
            Statement::Query(_) => StatementKind::Query,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
            Statement::Merge(_) => StatementKind::Merge,
            Statement::CreateTable(_) => StatementKind::CreateTable,
            Statement::CreateView(_) => StatementKind::CreateView,
            Statement::CreateProcedure(_) => StatementKind::CreateProcedure,
            Statement::Call(_) => StatementKind::Call,
            Statement::Block(_) => StatementKind::Block,
            Statement::If(_) => StatementKind::If,
            Statement::DeclareVar(_) => StatementKind::DeclareVar,
            Statement::SetVar(_) => StatementKind::SetVar,
            Statement::Drop(_) => StatementKind::Drop,
            Statement::Truncate(_) => StatementKind::Truncate,
            Statement::Unsupported(_) => StatementKind::Unsupported,
        }
    }
}

/// A `ROW_NUMBER() ... = 1` deduplication step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deduplication {
    pub input: String,
    pub output: String,
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
}

/// A node mentioned by a statement. `declared` is set for the nodes the statement
/// writes, whose column derivations replace earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeDeclaration {
    pub name: String,
    pub kind: NodeKind,
    pub columns: Vec<ColumnDescriptor>,
    pub declared: bool,
}

/// Extraction result of a single statement, before it is folded into the graph.
#[derive(Debug, Clone)]
pub(crate) struct StatementLineage {
    pub index: usize,
    pub line: u32,
    pub kind: StatementKind,
    pub tables: Vec<TableBinding>,
    pub targets: Vec<String>,
    pub nodes: Vec<NodeDeclaration>,
    pub flows: Vec<Edge>,
    pub deduplications: Vec<Deduplication>,
    pub warnings: Vec<Warning>,
    pub error: Option<String>,
    /// Procedure whose body contains the statement.
    pub procedure: Option<String>,
    pub children: Vec<StatementLineage>,
}

#[derive(Debug, Clone)]
struct DedupStep {
    input: String,
    window: RowNumberWindow,
    /// Row number column filtered on, dropped from `*` projections.
    helper: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct QueryLineage {
    columns: Vec<OutputColumn>,
    reads: IndexMap<String, ReadKind>,
    conditions: IndexMap<String, IndexSet<String>>,
    dedup: Option<DedupStep>,
    row_numbers: IndexMap<String, RowNumberWindow>,
    /// Nodes whose columns flow unchanged through an unresolved `*`.
    star_nodes: Vec<String>,
}

impl QueryLineage {
    /// Primary wins over secondary.
    fn add_read(&mut self, node: &str, kind: ReadKind) {
        match self.reads.get_mut(node) {
            Some(existing) => {
                if kind == ReadKind::Primary {
                    *existing = ReadKind::Primary;
                }
            }
            None => {
                self.reads.insert(node.to_owned(), kind);
            }
        }
    }

    fn add_conditions(&mut self, conditions: IndexMap<String, IndexSet<String>>) {
        for (node, texts) in conditions {
            self.conditions.entry(node).or_default().extend(texts);
        }
    }

    /// Takes the reads of a nested query (subquery, joined derived table) as secondary.
    fn absorb_secondary(&mut self, nested: QueryLineage) {
        for node in nested.reads.keys() {
            self.add_read(node, ReadKind::Secondary);
        }
        self.add_conditions(nested.conditions);
    }

    fn primary(&self) -> Option<&str> {
        self.reads
            .iter()
            .find(|(_, kind)| **kind == ReadKind::Primary)
            .map(|(node, _)| node.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct CteState {
    defined: bool,
    columns: Option<Vec<OutputColumn>>,
    row_numbers: IndexMap<String, RowNumberWindow>,
}

#[derive(Debug, Clone)]
struct CteFrame {
    recursive: bool,
    defining: Option<String>,
    ctes: IndexMap<String, CteState>,
}

#[derive(Debug, Clone)]
struct Write {
    target: String,
    role: NodeRole,
    kind: WriteKind,
    columns: Vec<OutputColumn>,
    reads: IndexMap<String, ReadKind>,
    conditions: IndexMap<String, IndexSet<String>>,
    dedup: bool,
    scd: bool,
}

impl Write {
    fn from_query(target: String, role: NodeRole, kind: WriteKind, lineage: QueryLineage) -> Self {
        Self {
            target,
            role,
            kind,
            columns: lineage.columns,
            reads: lineage.reads,
            conditions: lineage.conditions,
            dedup: false,
            scd: false,
        }
    }
}

const STAR: &str = "*";

fn rename_columns(columns: &mut [OutputColumn], names: &[Ident]) {
    for (column, name) in columns.iter_mut().zip(names) {
        column.name = name.normalized();
    }
}

fn has_unresolved_star(columns: &[OutputColumn]) -> bool {
    columns
        .iter()
        .any(|col| col.name == STAR && col.lineage.is_unresolved())
}

struct Extractor<'r> {
    ctx: &'r RunContext,
    locals: &'r IndexSet<String>,
    line: u32,
    procedure: Option<String>,
    /// Node the current projection is computed for, used in warnings.
    output: String,
    ctes: Vec<CteFrame>,
    warnings: Vec<Warning>,
    tables: Vec<TableBinding>,
    targets: Vec<String>,
    nodes: Vec<NodeDeclaration>,
    flows: Vec<Edge>,
    deduplications: Vec<Deduplication>,
    children: Vec<StatementLineage>,
}

impl<'r> Extractor<'r> {
    fn new(
        ctx: &'r RunContext,
        locals: &'r IndexSet<String>,
        line: u32,
        procedure: Option<&str>,
    ) -> Self {
        Self {
            ctx,
            locals,
            line,
            procedure: procedure.map(|name| name.to_owned()),
            output: "query".to_owned(),
            ctes: vec![],
            warnings: vec![],
            tables: vec![],
            targets: vec![],
            nodes: vec![],
            flows: vec![],
            deduplications: vec![],
            children: vec![],
        }
    }

    fn is_variable(&self, name: &str) -> bool {
        self.ctx.is_variable(name) || self.locals.contains(name)
    }

    fn scope_warning(&mut self, message: String) {
        self.warnings.push(Warning::Scope {
            line: self.line,
            message,
        });
    }

    fn target_role(&self, name: &str) -> NodeRole {
        if self.ctx.is_temporary(name) {
            NodeRole::Temporary
        } else if self.ctx.is_view(name) {
            NodeRole::View
        } else {
            NodeRole::Table
        }
    }

    fn source_role(&self, name: &str) -> NodeRole {
        if self.ctx.is_cte_name(name) {
            NodeRole::Cte
        } else if self.ctx.is_procedure(name) {
            NodeRole::Procedure
        } else if self.ctx.is_view(name) {
            NodeRole::View
        } else if self.ctx.is_temporary(name) {
            NodeRole::Temporary
        } else {
            NodeRole::Reference
        }
    }

    fn lookup_cte(&self, name: &str) -> Option<(&CteFrame, &CteState)> {
        self.ctes
            .iter()
            .rev()
            .find_map(|frame| frame.ctes.get(name).map(|state| (frame, state)))
    }

    fn node_columns(&self, node: &str) -> Option<Vec<OutputColumn>> {
        if let Some((_, state)) = self.lookup_cte(node) {
            return state.columns.clone();
        }
        self.ctx.columns_of(node).map(|columns| {
            columns
                .iter()
                .map(|col| OutputColumn {
                    name: col.clone(),
                    lineage: ColumnLineage::passthrough(node, col),
                })
                .collect()
        })
    }

    /// Binds a table reference to a CTE of the enclosing `WITH` chains or to an
    /// external object. CTEs may only reference CTEs defined before them.
    fn table_binding(&mut self, name: &ObjectName, alias: Option<&str>) -> Binding {
        let normalized = name.normalized();
        let mut binding = (Binding::Node(normalized.clone()), BindingKind::Source);

        if name.parts.len() == 1 {
            if let Some((frame, state)) = self.lookup_cte(&normalized) {
                let is_self_reference = frame.defining.as_deref() == Some(normalized.as_str());
                binding = if state.defined || (is_self_reference && frame.recursive) {
                    (Binding::Node(normalized.clone()), BindingKind::Cte)
                } else {
                    let message = if is_self_reference {
                        format!("CTE `{}` references itself without RECURSIVE", normalized)
                    } else {
                        format!(
                            "CTE `{}` is referenced before its definition in the same WITH clause",
                            normalized
                        )
                    };
                    self.scope_warning(message);
                    (Binding::Unknown, BindingKind::Unknown)
                };
            }
        }

        self.tables.push(TableBinding {
            object: normalized,
            alias: alias.map(|alias| alias.to_owned()),
            binding: binding.1,
        });
        binding.0
    }

    fn table_relation(
        &mut self,
        name: &ObjectName,
        alias: Option<String>,
        alias_columns: &[Ident],
    ) -> Relation {
        let binding = self.table_binding(name, alias.as_deref());
        let mut relation = Relation::new(binding, alias);
        if let Some(node) = relation.node().map(str::to_owned) {
            relation.columns = self.node_columns(&node);
            if let Some((_, state)) = self.lookup_cte(&node) {
                relation.row_numbers = state.row_numbers.clone();
            }
        }

        if !alias_columns.is_empty() {
            let node = relation.node().map(|node| node.to_owned());
            match (&mut relation.columns, node) {
                (Some(columns), _) => rename_columns(columns, alias_columns),
                (None, Some(node)) => {
                    relation.columns = Some(
                        alias_columns
                            .iter()
                            .map(|alias| OutputColumn {
                                name: alias.normalized(),
                                lineage: ColumnLineage::passthrough(&node, &alias.normalized()),
                            })
                            .collect(),
                    );
                }
                (None, None) => {}
            }
        }
        relation
    }

    fn derived_relation(&mut self, lineage: &QueryLineage, alias: Option<String>) -> Relation {
        let mut relation = Relation::new(Binding::Derived, alias);
        relation.row_numbers = lineage.row_numbers.clone();
        if has_unresolved_star(&lineage.columns) {
            relation.passthrough_nodes = lineage.star_nodes.clone();
        } else {
            relation.columns = Some(lineage.columns.clone());
        }
        relation
    }

    fn from_lin<'q>(
        &mut self,
        from: &'q FromExpr,
        parent: Option<&Scope>,
        leftmost: bool,
        relations: &mut Vec<Relation>,
        lineage: &mut QueryLineage,
        joins: &mut Vec<&'q Expr>,
    ) {
        match from {
            FromExpr::Table(table) => {
                let alias = table.alias.as_ref().map(|alias| alias.name.normalized());
                let alias_columns = table
                    .alias
                    .as_ref()
                    .map(|alias| alias.columns.as_slice())
                    .unwrap_or_default();
                let relation = self.table_relation(&table.name, alias, alias_columns);
                if let Some(node) = relation.node() {
                    let kind = if leftmost {
                        ReadKind::Primary
                    } else {
                        ReadKind::Secondary
                    };
                    lineage.add_read(node, kind);
                }
                relations.push(relation);
            }
            FromExpr::Derived(derived) => {
                let inner = if derived.lateral {
                    let lateral_scope = Scope::new(relations.clone(), parent);
                    self.query_lin(&derived.query, Some(&lateral_scope))
                } else {
                    self.query_lin(&derived.query, parent)
                };
                let alias = derived.alias.as_ref().map(|alias| alias.name.normalized());
                let mut relation = self.derived_relation(&inner, alias);
                if let (Some(columns), Some(alias)) = (&mut relation.columns, &derived.alias) {
                    rename_columns(columns, &alias.columns);
                }
                relations.push(relation);

                if leftmost {
                    for (node, kind) in &inner.reads {
                        lineage.add_read(node, *kind);
                    }
                    lineage.add_conditions(inner.conditions);
                } else {
                    lineage.absorb_secondary(inner);
                }
            }
            FromExpr::Function(function) => {
                let alias = function.alias.as_ref().map(|alias| alias.name.normalized());
                let mut relation = Relation::new(Binding::Function, alias);
                if let Some(alias) = &function.alias {
                    if !alias.columns.is_empty() {
                        relation.columns = Some(
                            alias
                                .columns
                                .iter()
                                .map(|col| OutputColumn {
                                    name: col.normalized(),
                                    lineage: ColumnLineage::default(),
                                })
                                .collect(),
                        );
                    }
                }
                relations.push(relation);
            }
            FromExpr::Join(join) => {
                self.from_lin(&join.left, parent, leftmost, relations, lineage, joins);
                self.from_lin(&join.right, parent, false, relations, lineage, joins);
                if let JoinConstraint::On(condition) = &join.constraint {
                    joins.push(condition);
                }
            }
            FromExpr::Grouping(inner) => {
                self.from_lin(inner, parent, leftmost, relations, lineage, joins)
            }
        }
    }

    /// Records a join predicate on every node it references.
    fn condition_lin(&mut self, condition: &Expr, scope: &Scope, lineage: &mut QueryLineage) {
        let text = normalize(condition);
        let mut columns = vec![];
        visit_columns(condition, &mut |name| columns.push(name));
        for name in columns {
            if let Resolution::Found(column) = scope.resolve(name, |var| self.is_variable(var)) {
                for origin in column.sources {
                    lineage
                        .conditions
                        .entry(origin.node)
                        .or_default()
                        .insert(text.clone());
                }
            }
        }
    }

    fn subqueries_lin(&mut self, expr: &Expr, scope: &Scope, lineage: &mut QueryLineage) {
        let mut subqueries = vec![];
        visit_subqueries(expr, &mut |query| subqueries.push(query));
        for query in subqueries {
            let nested = self.query_lin(query, Some(scope));
            lineage.absorb_secondary(nested);
        }
    }

    fn column_lin(&mut self, name: &ObjectName, scope: &Scope) -> ColumnLineage {
        match scope.resolve(name, |var| self.is_variable(var)) {
            Resolution::Found(lineage) => lineage,
            Resolution::Variable => ColumnLineage {
                sources: IndexSet::new(),
                derivation: Some(normalize(&Expr::Column(name.clone()))),
            },
            Resolution::Unresolved(reason) => {
                self.warnings.push(Warning::UnresolvedColumn {
                    line: self.line,
                    node: self.output.clone(),
                    column: name.to_string(),
                    reason,
                });
                ColumnLineage::unresolved(IndexSet::new())
            }
            Resolution::UndefinedQualifier(qualifier) => {
                self.scope_warning(format!(
                    "Undefined table or alias `{}` referenced by `{}`",
                    qualifier, name
                ));
                ColumnLineage::unresolved(IndexSet::new())
            }
        }
    }

    /// Lineage of an output expression. Bare columns pass through, anything else is
    /// derived through its normalized text from every column it references.
    fn expr_lin(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        lineage: &mut QueryLineage,
    ) -> ColumnLineage {
        if let Expr::Column(name) = expr {
            return self.column_lin(name, scope);
        }

        let mut columns = vec![];
        visit_columns(expr, &mut |name| columns.push(name));
        let mut sources = IndexSet::new();
        for name in columns {
            sources.extend(self.column_lin(name, scope).sources);
        }

        let mut subqueries = vec![];
        visit_subqueries(expr, &mut |query| subqueries.push(query));
        for query in subqueries {
            let nested = self.query_lin(query, Some(scope));
            for column in &nested.columns {
                sources.extend(column.lineage.sources.iter().cloned());
            }
            lineage.absorb_secondary(nested);
        }

        ColumnLineage {
            sources,
            derivation: Some(normalize(expr)),
        }
    }

    /// Expands `*` over the given relations. Relations with unknown columns yield a
    /// single unresolved `*` column and one warning.
    fn wildcard_lin(
        &mut self,
        relations: &[&Relation],
        except: &[Ident],
        lineage: &mut QueryLineage,
    ) {
        let except = except
            .iter()
            .map(|ident| ident.normalized())
            .collect::<Vec<_>>();
        let mut sources = IndexSet::new();
        let mut unknown = vec![];
        for relation in relations {
            match &relation.columns {
                Some(columns) => lineage.columns.extend(
                    columns
                        .iter()
                        .filter(|col| !except.contains(&col.name))
                        .cloned(),
                ),
                None => {
                    unknown.push(format!("`{}`", relation.label()));
                    let nodes = match relation.node() {
                        Some(node) => vec![node.to_owned()],
                        None => relation.passthrough_nodes.clone(),
                    };
                    for node in nodes {
                        sources.insert(ColumnOrigin {
                            node: node.clone(),
                            column: STAR.to_owned(),
                        });
                        if !lineage.star_nodes.contains(&node) {
                            lineage.star_nodes.push(node);
                        }
                    }
                }
            }
        }

        if !unknown.is_empty() {
            self.warnings.push(Warning::UnresolvedColumn {
                line: self.line,
                node: self.output.clone(),
                column: STAR.to_owned(),
                reason: format!("columns of {} are unknown", unknown.join(", ")),
            });
            lineage.columns.push(OutputColumn {
                name: STAR.to_owned(),
                lineage: ColumnLineage::unresolved(sources),
            });
        }
    }

    /// Recognizes `WHERE rn = 1` over a single relation exposing a `ROW_NUMBER()`
    /// column, and `QUALIFY ROW_NUMBER() OVER (...) = 1`.
    fn dedup_lin(
        &self,
        select: &Select,
        scope: &Scope,
        lineage: &QueryLineage,
    ) -> Option<DedupStep> {
        let input = lineage.primary()?.to_owned();

        if let Some(qualify) = &select.qualify {
            for conjunct in conjuncts(qualify) {
                let Some(operand) = first_row_filter_operand(conjunct) else {
                    continue;
                };
                let window = match operand {
                    Expr::Column(name) => name
                        .last()
                        .and_then(|ident| lineage.row_numbers.get(&ident.normalized()))
                        .cloned(),
                    _ => row_number_window(operand, &select.window),
                };
                if let Some(window) = window {
                    return Some(DedupStep {
                        input,
                        window,
                        helper: None,
                    });
                }
            }
        }

        let (Some(filter), [relation]) = (&select.r#where, scope.relations.as_slice()) else {
            return None;
        };
        for conjunct in conjuncts(filter) {
            let Some(Expr::Column(name)) = first_row_filter_operand(conjunct) else {
                continue;
            };
            let Some(column) = name.last().map(|ident| ident.normalized()) else {
                continue;
            };
            if let Some(window) = relation.row_numbers.get(&column) {
                return Some(DedupStep {
                    input,
                    window: window.clone(),
                    helper: Some(column),
                });
            }
        }
        None
    }

    fn select_lin(&mut self, select: &Select, parent: Option<&Scope>) -> QueryLineage {
        let mut lineage = QueryLineage::default();
        let mut relations = vec![];
        let mut joins = vec![];
        if let Some(from) = &select.from {
            self.from_lin(from, parent, true, &mut relations, &mut lineage, &mut joins);
        }
        let scope = Scope::new(relations, parent);
        for condition in joins {
            self.condition_lin(condition, &scope, &mut lineage);
        }

        for item in &select.projection {
            match item {
                SelectItem::Expr { expr, alias } => {
                    let name = alias
                        .as_ref()
                        .map(|alias| alias.normalized())
                        .unwrap_or_else(|| unnamed_column_name(expr));
                    if let Some(window) = row_number_window(expr, &select.window) {
                        lineage.row_numbers.insert(name.clone(), window);
                    }
                    let column = self.expr_lin(expr, &scope, &mut lineage);
                    lineage.columns.push(OutputColumn {
                        name,
                        lineage: column,
                    });
                }
                SelectItem::Wildcard { except } => {
                    let relations = scope.relations.iter().collect::<Vec<_>>();
                    self.wildcard_lin(&relations, except, &mut lineage);
                }
                SelectItem::QualifiedWildcard { qualifier, except } => {
                    match scope.find_relation(qualifier) {
                        Some(relation) => self.wildcard_lin(&[relation], except, &mut lineage),
                        None => {
                            self.scope_warning(format!(
                                "Undefined table or alias `{}` referenced by `{}.*`",
                                qualifier, qualifier
                            ));
                            lineage.columns.push(OutputColumn {
                                name: STAR.to_owned(),
                                lineage: ColumnLineage::unresolved(IndexSet::new()),
                            });
                        }
                    }
                }
            }
        }

        for expr in [&select.r#where, &select.having, &select.qualify]
            .into_iter()
            .flatten()
        {
            self.subqueries_lin(expr, &scope, &mut lineage);
        }

        lineage.dedup = self.dedup_lin(select, &scope, &lineage);
        if let Some(helper) = lineage.dedup.as_ref().and_then(|dedup| dedup.helper.clone()) {
            let has_wildcard = select
                .projection
                .iter()
                .any(|item| !matches!(item, SelectItem::Expr { .. }));
            if has_wildcard {
                lineage.columns.retain(|col| col.name != helper);
            }
        }
        lineage
    }

    fn set_expr_lin(&mut self, body: &SetExpr, parent: Option<&Scope>) -> QueryLineage {
        match body {
            SetExpr::Select(select) => self.select_lin(select, parent),
            SetExpr::Query(query) => self.query_lin(query, parent),
            SetExpr::SetOperation { left, right, .. } => {
                // names and derivations come from the first branch
                let mut lineage = self.set_expr_lin(left, parent);
                let right = self.set_expr_lin(right, parent);
                for (column, other) in lineage.columns.iter_mut().zip(right.columns) {
                    column.lineage.sources.extend(other.lineage.sources);
                }
                for (node, kind) in right.reads {
                    lineage.add_read(&node, kind);
                }
                lineage.add_conditions(right.conditions);
                lineage.star_nodes.extend(right.star_nodes);
                lineage.dedup = None;
                lineage
            }
            SetExpr::Values(rows) => {
                let columns = rows
                    .first()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .map(|(i, expr)| OutputColumn {
                                name: format!("column{}", i + 1),
                                lineage: ColumnLineage {
                                    sources: IndexSet::new(),
                                    derivation: Some(normalize(expr)),
                                },
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                QueryLineage {
                    columns,
                    ..Default::default()
                }
            }
        }
    }

    fn query_lin(&mut self, query: &Query, parent: Option<&Scope>) -> QueryLineage {
        let pushed = self.push_with(query.with.as_ref(), parent);
        let lineage = self.set_expr_lin(&query.body, parent);
        self.pop_with(pushed);
        lineage
    }

    fn push_with(&mut self, with: Option<&With>, parent: Option<&Scope>) -> bool {
        let Some(with) = with else {
            return false;
        };
        self.ctes.push(CteFrame {
            recursive: with.recursive,
            defining: None,
            ctes: with
                .ctes
                .iter()
                .map(|cte| (cte.name.normalized(), CteState::default()))
                .collect(),
        });
        for cte in &with.ctes {
            self.cte_lin(cte, parent);
        }
        true
    }

    fn pop_with(&mut self, pushed: bool) {
        if pushed {
            self.ctes.pop();
        }
    }

    fn cte_lin(&mut self, cte: &Cte, parent: Option<&Scope>) {
        let name = cte.name.normalized();
        if let Some(frame) = self.ctes.last_mut() {
            frame.defining = Some(name.clone());
        }

        let previous_output = std::mem::replace(&mut self.output, name.clone());
        let mut lineage = self.query_lin(&cte.query, parent);
        self.output = previous_output;
        rename_columns(&mut lineage.columns, &cte.columns);

        if let Some(frame) = self.ctes.last_mut() {
            frame.defining = None;
            if let Some(state) = frame.ctes.get_mut(&name) {
                state.defined = true;
                state.row_numbers = lineage.row_numbers.clone();
                state.columns = (!has_unresolved_star(&lineage.columns)).then(|| {
                    lineage
                        .columns
                        .iter()
                        .map(|col| OutputColumn {
                            name: col.name.clone(),
                            lineage: ColumnLineage::passthrough(&name, &col.name),
                        })
                        .collect()
                });
            }
        }

        self.record_dedup(&name, &lineage);
        let dedup = lineage.dedup.is_some();
        let mut write = Write::from_query(name, NodeRole::Cte, WriteKind::Cte, lineage);
        write.dedup = dedup;
        self.write_lin(write);
    }

    fn record_dedup(&mut self, output: &str, lineage: &QueryLineage) {
        if let Some(dedup) = &lineage.dedup {
            self.deduplications.push(Deduplication {
                input: dedup.input.clone(),
                output: output.to_owned(),
                partition_by: dedup.window.partition_by.clone(),
                order_by: dedup.window.order_by.clone(),
            });
        }
    }

    /// Turns a write into the target declaration and one raw edge per node read.
    fn write_lin(&mut self, write: Write) {
        let Write {
            target,
            role,
            kind,
            columns,
            reads,
            conditions,
            dedup,
            scd,
        } = write;

        if kind != WriteKind::Cte && !self.targets.contains(&target) {
            self.targets.push(target.clone());
        }
        self.nodes.push(NodeDeclaration {
            name: target.clone(),
            kind: node_kind(&target, role, dedup),
            columns: columns
                .iter()
                .map(|col| ColumnDescriptor {
                    name: col.name.clone(),
                    derivation: col.lineage.derivation.clone(),
                })
                .collect(),
            declared: true,
        });

        for (source, read) in reads {
            if source == target {
                log::debug!("Dropping self-loop on `{}` at line {}", target, self.line);
                continue;
            }

            let flow = Flow {
                target: &target,
                target_role: role,
                write: kind,
                read,
                dedup,
                scd,
                source_defined_in_run: self.ctx.is_defined_in_run(&source),
            };
            let operation = flow.operation();

            let mut column_map = IndexMap::new();
            let mut source_columns: IndexSet<String> = IndexSet::new();
            for column in &columns {
                let origins = column
                    .lineage
                    .sources
                    .iter()
                    .filter(|origin| origin.node == source)
                    .map(|origin| origin.column.clone())
                    .collect::<Vec<_>>();
                if origins.is_empty() {
                    continue;
                }
                source_columns.extend(origins.iter().filter(|col| *col != STAR).cloned());
                column_map.insert(
                    column.name.clone(),
                    ColumnMapping {
                        sources: origins,
                        derivation: column.lineage.derivation.clone(),
                    },
                );
            }

            self.nodes.push(NodeDeclaration {
                name: source.clone(),
                kind: node_kind(&source, self.source_role(&source), false),
                columns: source_columns
                    .into_iter()
                    .map(|name| ColumnDescriptor {
                        name,
                        derivation: None,
                    })
                    .collect(),
                declared: false,
            });
            self.flows.push(Edge {
                conditions: conditions
                    .get(&source)
                    .map(|texts| texts.iter().cloned().collect())
                    .unwrap_or_default(),
                source_node: source,
                target_node: target.clone(),
                operation,
                column_map,
            });
        }
    }

    /// Maps query columns onto the target's column list, or onto its known columns.
    fn target_columns(
        &mut self,
        target: &str,
        names: Option<&[Ident]>,
        columns: Vec<OutputColumn>,
    ) -> Vec<OutputColumn> {
        if has_unresolved_star(&columns) {
            return columns;
        }
        let names = match names {
            Some(names) => names.iter().map(|name| name.normalized()).collect::<Vec<_>>(),
            None => match self.ctx.columns_of(target) {
                Some(known) => known.to_vec(),
                None => return columns,
            },
        };
        if names.len() != columns.len() {
            self.warnings.push(Warning::ColumnCountMismatch {
                line: self.line,
                target: target.to_owned(),
                expected: names.len(),
                found: columns.len(),
            });
        }
        names
            .into_iter()
            .zip(columns)
            .map(|(name, column)| OutputColumn {
                name,
                lineage: column.lineage,
            })
            .collect()
    }

    fn query_statement_lin(&mut self, query_statement: &QueryStatement) {
        let query = &query_statement.query;
        let into = match &query.body {
            SetExpr::Select(select) => select.into.as_ref(),
            _ => None,
        };
        let targets = into
            .map(|into| {
                into.targets
                    .iter()
                    .map(|target| target.normalized())
                    .filter(|target| !self.is_variable(target))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if let Some(target) = targets.first() {
            self.output = target.clone();
        }

        let lineage = self.query_lin(query, None);
        let temporary = into.is_some_and(|into| into.temporary);
        for target in targets {
            let role = if temporary || self.ctx.is_temporary(&target) {
                NodeRole::Temporary
            } else {
                NodeRole::Table
            };
            self.record_dedup(&target, &lineage);
            self.write_lin(Write::from_query(
                target,
                role,
                WriteKind::SelectInto,
                lineage.clone(),
            ));
        }
    }

    fn insert_statement_lin(&mut self, insert: &InsertStatement) {
        let target = insert.table.normalized();
        self.output = target.clone();
        let pushed = self.push_with(insert.with.as_ref(), None);

        let mut lineage = match &insert.source {
            InsertSource::Query(query) => self.query_lin(query, None),
            InsertSource::DefaultValues => QueryLineage::default(),
        };
        self.record_dedup(&target, &lineage);
        let columns = std::mem::take(&mut lineage.columns);
        lineage.columns = self.target_columns(&target, insert.columns.as_deref(), columns);

        let mut kind = WriteKind::Insert;
        let mut scd = lineage.columns.iter().any(|col| col.name == "is_current");
        if let Some(OnConflict {
            action: OnConflictAction::DoUpdate { items, .. },
            ..
        }) = &insert.on_conflict
        {
            kind = WriteKind::Upsert;
            let mut target_relation = Relation::new(Binding::Node(target.clone()), None);
            target_relation.columns = self.node_columns(&target);
            let mut excluded = Relation::new(Binding::Derived, Some("excluded".to_owned()));
            excluded.columns = Some(lineage.columns.clone());
            let scope = Scope::new(vec![target_relation, excluded], None);

            for item in items {
                let Some(name) = item.column.last().map(|ident| ident.normalized()) else {
                    continue;
                };
                scd |= name == "is_current";
                let column = self.expr_lin(&item.expr, &scope, &mut lineage);
                if !lineage.columns.iter().any(|col| col.name == name) {
                    lineage.columns.push(OutputColumn {
                        name,
                        lineage: column,
                    });
                }
            }
        }
        self.pop_with(pushed);

        let role = self.target_role(&target);
        let mut write = Write::from_query(target, role, kind, lineage);
        write.scd = scd;
        self.write_lin(write);
    }

    fn update_statement_lin(&mut self, update: &UpdateStatement) {
        let pushed = self.push_with(update.with.as_ref(), None);
        let mut lineage = QueryLineage::default();
        let mut relations = vec![];
        let mut joins = vec![];
        if let Some(from) = &update.from {
            self.from_lin(from, None, true, &mut relations, &mut lineage, &mut joins);
        }

        // UPDATE alias SET ... FROM table alias
        let name = update.table.normalized();
        let target = relations
            .iter()
            .find(|rel| rel.alias.as_deref() == Some(name.as_str()))
            .and_then(|rel| rel.node())
            .map(|node| node.to_owned())
            .unwrap_or(name);
        self.output = target.clone();

        if !relations.iter().any(|rel| rel.node() == Some(target.as_str())) {
            let alias = update.alias.as_ref().map(|alias| alias.normalized());
            self.tables.push(TableBinding {
                object: target.clone(),
                alias: alias.clone(),
                binding: BindingKind::Source,
            });
            let mut relation = Relation::new(Binding::Node(target.clone()), alias);
            relation.columns = self.node_columns(&target);
            relations.insert(0, relation);
        }

        let scope = Scope::new(relations, None);
        for condition in joins {
            self.condition_lin(condition, &scope, &mut lineage);
        }
        for item in &update.items {
            let Some(name) = item.column.last().map(|ident| ident.normalized()) else {
                continue;
            };
            let column = self.expr_lin(&item.expr, &scope, &mut lineage);
            lineage.columns.push(OutputColumn {
                name,
                lineage: column,
            });
        }
        if let Some(filter) = &update.r#where {
            self.subqueries_lin(filter, &scope, &mut lineage);
        }
        self.pop_with(pushed);

        let role = self.target_role(&target);
        self.write_lin(Write::from_query(target, role, WriteKind::Update, lineage));
    }

    fn delete_statement_lin(&mut self, delete: &DeleteStatement) {
        self.tables.push(TableBinding {
            object: delete.table.normalized(),
            alias: delete.alias.as_ref().map(|alias| alias.normalized()),
            binding: BindingKind::Source,
        });
        if let Some(using) = &delete.using {
            let mut lineage = QueryLineage::default();
            self.from_lin(using, None, false, &mut vec![], &mut lineage, &mut vec![]);
        }
    }

    fn merge_statement_lin(&mut self, merge: &MergeStatement) {
        let target = merge.target.normalized();
        self.output = target.clone();
        let pushed = self.push_with(merge.with.as_ref(), None);
        let mut lineage = QueryLineage::default();

        let target_alias = merge.target_alias.as_ref().map(|alias| alias.normalized());
        self.tables.push(TableBinding {
            object: target.clone(),
            alias: target_alias.clone(),
            binding: BindingKind::Source,
        });
        let mut target_relation = Relation::new(Binding::Node(target.clone()), target_alias);
        target_relation.columns = self.node_columns(&target);

        let source_alias = merge.source_alias.as_ref().map(|alias| alias.normalized());
        let source_relation = match &merge.source {
            MergeSource::Table(name) => {
                let relation = self.table_relation(name, source_alias, &[]);
                if let Some(node) = relation.node() {
                    lineage.add_read(node, ReadKind::Primary);
                }
                relation
            }
            MergeSource::Subquery(query) => {
                let inner = self.query_lin(query, None);
                let relation = self.derived_relation(&inner, source_alias);
                for (node, kind) in &inner.reads {
                    lineage.add_read(node, *kind);
                }
                lineage.add_conditions(inner.conditions);
                relation
            }
        };

        let scope = Scope::new(vec![target_relation, source_relation], None);
        self.condition_lin(&merge.condition, &scope, &mut lineage);
        let mut scd = mentions_column(&merge.condition, "is_current");

        let mut columns: IndexMap<String, ColumnLineage> = IndexMap::new();
        for when in &merge.whens {
            if let Some(condition) = &when.condition {
                scd |= mentions_column(condition, "is_current");
            }
            match &when.action {
                MergeAction::Update(items) => {
                    for item in items {
                        let Some(name) = item.column.last().map(|ident| ident.normalized())
                        else {
                            continue;
                        };
                        let column = self.expr_lin(&item.expr, &scope, &mut lineage);
                        columns.entry(name).or_insert(column);
                    }
                }
                MergeAction::Insert {
                    columns: names,
                    values,
                } => {
                    let names: Vec<String> = match names {
                        Some(names) => names.iter().map(|name| name.normalized()).collect(),
                        None => match self.ctx.columns_of(&target) {
                            Some(known) => known.to_vec(),
                            None => values.iter().map(unnamed_column_name).collect(),
                        },
                    };
                    if names.len() != values.len() {
                        self.warnings.push(Warning::ColumnCountMismatch {
                            line: self.line,
                            target: target.clone(),
                            expected: names.len(),
                            found: values.len(),
                        });
                    }
                    for (name, value) in names.into_iter().zip(values) {
                        let column = self.expr_lin(value, &scope, &mut lineage);
                        columns.entry(name).or_insert(column);
                    }
                }
                MergeAction::InsertRow => {
                    if let Some(source_columns) = &scope.relations[1].columns {
                        for col in source_columns {
                            columns
                                .entry(col.name.clone())
                                .or_insert_with(|| col.lineage.clone());
                        }
                    }
                }
                MergeAction::Delete | MergeAction::DoNothing => {}
            }
        }
        scd |= columns.contains_key("is_current");
        lineage.columns = columns
            .into_iter()
            .map(|(name, lineage)| OutputColumn { name, lineage })
            .collect();
        self.pop_with(pushed);

        let role = self.target_role(&target);
        let mut write = Write::from_query(target, role, WriteKind::Merge, lineage);
        write.scd = scd;
        self.write_lin(write);
    }

    fn create_table_statement_lin(&mut self, create: &CreateTableStatement) {
        let target = create.name.normalized();
        self.output = target.clone();
        let role = if create.temporary || self.ctx.is_temporary(&target) {
            NodeRole::Temporary
        } else {
            NodeRole::Table
        };

        let Some(query) = &create.query else {
            self.targets.push(target.clone());
            self.nodes.push(NodeDeclaration {
                kind: node_kind(&target, role, false),
                name: target,
                columns: create
                    .columns
                    .iter()
                    .map(|col| ColumnDescriptor {
                        name: col.name.normalized(),
                        derivation: None,
                    })
                    .collect(),
                declared: true,
            });
            return;
        };

        let mut lineage = self.query_lin(query, None);
        let names = create
            .columns
            .iter()
            .map(|col| col.name.clone())
            .collect::<Vec<_>>();
        rename_columns(&mut lineage.columns, &names);
        self.record_dedup(&target, &lineage);
        self.write_lin(Write::from_query(target, role, WriteKind::Ctas, lineage));
    }

    fn create_view_statement_lin(&mut self, create: &CreateViewStatement) {
        let target = create.name.normalized();
        self.output = target.clone();
        let mut lineage = self.query_lin(&create.query, None);
        rename_columns(&mut lineage.columns, &create.columns);
        self.record_dedup(&target, &lineage);

        let (role, kind) = if create.materialized {
            (NodeRole::Table, WriteKind::MaterializedView)
        } else {
            (NodeRole::View, WriteKind::View)
        };
        let dedup = !create.materialized && lineage.dedup.is_some();
        let mut write = Write::from_query(target, role, kind, lineage);
        write.dedup = dedup;
        self.write_lin(write);
    }

    fn create_procedure_statement_lin(&mut self, create: &CreateProcedureStatement) {
        let name = create.name.normalized();
        self.targets.push(name.clone());
        self.nodes.push(NodeDeclaration {
            name: name.clone(),
            kind: NodeKind::Procedure,
            columns: vec![],
            declared: true,
        });

        let mut locals = self.locals.clone();
        locals.extend(create.parameters.iter().map(|param| param.name.to_lowercase()));
        locals.extend(create.declarations.iter().map(|name| name.to_lowercase()));
        for parsed in &create.body {
            self.children
                .push(extract_nested(parsed, self.ctx, Some(name.as_str()), &locals));
        }
    }

    fn call_statement_lin(&mut self, call: &CallStatement) {
        self.nodes.push(NodeDeclaration {
            name: call.procedure.normalized(),
            kind: NodeKind::Procedure,
            columns: vec![],
            declared: false,
        });
    }

    fn nested_lin(&mut self, statements: &[ParsedStatement]) {
        for parsed in statements {
            let child = extract_nested(parsed, self.ctx, self.procedure.as_deref(), self.locals);
            self.children.push(child);
        }
    }

    fn statement_lin(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query_statement) => self.query_statement_lin(query_statement),
            Statement::Insert(insert_statement) => self.insert_statement_lin(insert_statement),
            Statement::Update(update_statement) => self.update_statement_lin(update_statement),
            Statement::Delete(delete_statement) => self.delete_statement_lin(delete_statement),
            Statement::Merge(merge_statement) => self.merge_statement_lin(merge_statement),
            Statement::CreateTable(create_table_statement) => {
                self.create_table_statement_lin(create_table_statement)
            }
            Statement::CreateView(create_view_statement) => {
                self.create_view_statement_lin(create_view_statement)
            }
            Statement::CreateProcedure(create_procedure_statement) => {
                self.create_procedure_statement_lin(create_procedure_statement)
            }
            Statement::Call(call_statement) => self.call_statement_lin(call_statement),
            Statement::Block(statements_block) => {
                self.nested_lin(&statements_block.statements);
                self.nested_lin(&statements_block.exception_statements);
            }
            Statement::If(if_statement) => {
                for branch in &if_statement.branches {
                    self.nested_lin(&branch.statements);
                }
                self.nested_lin(&if_statement.r#else);
            }
            Statement::DeclareVar(_) | Statement::SetVar(_) => {
                // Variables are collected by the run context
            }
            Statement::Drop(_) | Statement::Truncate(_) => {}
            Statement::Unsupported(unsupported) => {
                log::debug!(
                    "Skipping `{}` statement at line {}",
                    unsupported.keyword,
                    self.line
                );
            }
        }
    }

    fn finish(self, index: usize, kind: StatementKind, error: Option<String>) -> StatementLineage {
        StatementLineage {
            index,
            line: self.line,
            kind,
            tables: self.tables,
            targets: self.targets,
            nodes: self.nodes,
            flows: self.flows,
            deduplications: self.deduplications,
            warnings: self.warnings,
            error,
            procedure: self.procedure,
            children: self.children,
        }
    }
}

fn extract_nested(
    parsed: &ParsedStatement,
    ctx: &RunContext,
    procedure: Option<&str>,
    locals: &IndexSet<String>,
) -> StatementLineage {
    let mut extractor = Extractor::new(ctx, locals, parsed.line, procedure);
    match &parsed.result {
        Ok(statement) => {
            extractor.statement_lin(statement);
            extractor.finish(parsed.index, StatementKind::of(statement), None)
        }
        Err(err) => {
            extractor.warnings.push(Warning::Syntax {
                statement: parsed.index,
                line: err.line,
                message: err.message.clone(),
            });
            extractor.finish(parsed.index, StatementKind::Invalid, Some(err.to_string()))
        }
    }
}

/// Extracts the lineage of one top-level statement.
pub(crate) fn extract_statement(parsed: &ParsedStatement, ctx: &RunContext) -> StatementLineage {
    extract_nested(parsed, ctx, None, &IndexSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dialect::Dialect, lineage::catalog::Catalog, parser::parse_statements};

    fn extract(sql: &str) -> Vec<StatementLineage> {
        let statements = parse_statements(sql, Dialect::Postgres).collect::<Vec<_>>();
        let ctx = RunContext::build(&statements, &Catalog::default());
        statements
            .iter()
            .map(|parsed| extract_statement(parsed, &ctx))
            .collect()
    }

    fn flow<'a>(lineage: &'a StatementLineage, source: &str, target: &str) -> &'a Edge {
        lineage
            .flows
            .iter()
            .find(|edge| edge.source_node == source && edge.target_node == target)
            .unwrap_or_else(|| panic!("missing flow {} -> {}", source, target))
    }

    #[test]
    fn cte_chain_flows() {
        let lineage = extract(
            "WITH extracted AS (SELECT id, name FROM source_db.customers),
                  cleaned AS (SELECT id, UPPER(TRIM(name)) AS name FROM extracted)
             INSERT INTO mart.customers SELECT c.id, c.name FROM cleaned c",
        );
        let statement = &lineage[0];
        assert!(statement.warnings.is_empty());
        assert_eq!(statement.targets, vec!["mart.customers"]);

        let extract_edge = flow(statement, "source_db.customers", "extracted");
        assert_eq!(extract_edge.operation.to_string(), "EXTRACT");

        let transform = flow(statement, "extracted", "cleaned");
        assert_eq!(transform.operation.to_string(), "TRANSFORM");
        assert_eq!(
            transform.column_map["name"],
            ColumnMapping {
                sources: vec!["name".to_owned()],
                derivation: Some("UPPER(TRIM(name))".to_owned()),
            }
        );

        let load = flow(statement, "cleaned", "mart.customers");
        assert_eq!(load.operation.to_string(), "LOAD");
        assert_eq!(load.column_map["name"].derivation, None);
    }

    #[test]
    fn forward_cte_reference_is_a_scope_warning() {
        let lineage =
            extract("WITH a AS (SELECT x FROM b), b AS (SELECT x FROM src.t) SELECT * FROM a");
        let statement = &lineage[0];
        assert!(matches!(statement.warnings[0], Warning::Scope { .. }));
        assert!(
            statement
                .flows
                .iter()
                .all(|edge| edge.target_node != "a" || edge.source_node != "b")
        );
        assert!(
            statement
                .tables
                .iter()
                .any(|table| table.object == "b" && table.binding == BindingKind::Unknown)
        );
    }

    #[test]
    fn unresolved_star_warns_once() {
        let lineage = extract(
            "CREATE TABLE stg_copy AS SELECT * FROM raw.events e JOIN raw.users u ON e.uid = u.id",
        );
        let statement = &lineage[0];
        let star_warnings = statement
            .warnings
            .iter()
            .filter(|warning| {
                matches!(warning, Warning::UnresolvedColumn { column, .. } if column == "*")
            })
            .count();
        assert_eq!(star_warnings, 1);
        let declaration = &statement.nodes[0];
        assert_eq!(declaration.name, "stg_copy");
        assert_eq!(
            declaration.columns,
            vec![ColumnDescriptor {
                name: "*".to_owned(),
                derivation: Some("unresolved".to_owned()),
            }]
        );
        assert_eq!(
            flow(statement, "raw.events", "stg_copy").conditions,
            vec!["uid = id"]
        );
    }

    #[test]
    fn detects_row_number_deduplication() {
        let lineage = extract(
            "WITH cleaned AS (SELECT id, email, updated_at FROM src.customers),
                  deduped AS (
                    SELECT * FROM (
                      SELECT *, ROW_NUMBER() OVER (PARTITION BY id ORDER BY updated_at DESC) AS rn
                      FROM cleaned
                    ) t WHERE rn = 1
                  )
             SELECT * FROM deduped",
        );
        let statement = &lineage[0];
        assert!(statement.warnings.is_empty());
        assert_eq!(
            statement.deduplications,
            vec![Deduplication {
                input: "cleaned".to_owned(),
                output: "deduped".to_owned(),
                partition_by: vec!["id".to_owned()],
                order_by: vec!["updated_at DESC".to_owned()],
            }]
        );
        let deduped = statement
            .nodes
            .iter()
            .find(|node| node.name == "deduped" && node.declared)
            .unwrap();
        assert_eq!(deduped.kind, NodeKind::Transform);
        assert_eq!(
            deduped
                .columns
                .iter()
                .map(|col| col.name.as_str())
                .collect::<Vec<_>>(),
            vec!["id", "email", "updated_at"]
        );
        assert_eq!(
            flow(statement, "cleaned", "deduped").operation.to_string(),
            "TRANSFORM"
        );
    }

    #[test]
    fn qualify_deduplication() {
        let lineage = extract(
            "CREATE VIEW latest_orders AS
             SELECT * FROM staging.orders
             QUALIFY ROW_NUMBER() OVER (PARTITION BY order_id ORDER BY loaded_at DESC) = 1",
        );
        let statement = &lineage[0];
        assert_eq!(statement.deduplications.len(), 1);
        assert_eq!(statement.deduplications[0].input, "staging.orders");
        assert_eq!(statement.nodes[0].kind, NodeKind::Transform);
    }

    #[test]
    fn insert_column_count_mismatch() {
        let lineage = extract("INSERT INTO dst (a, b) SELECT x, y, z FROM src.t");
        let statement = &lineage[0];
        assert_eq!(
            statement.warnings,
            vec![Warning::ColumnCountMismatch {
                line: 1,
                target: "dst".to_owned(),
                expected: 2,
                found: 3,
            }]
        );
        let edge = flow(statement, "src.t", "dst");
        assert_eq!(edge.column_map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(edge.column_map["b"].sources, vec!["y"]);
    }

    #[test]
    fn merge_into_dimension() {
        let lineage = extract(
            "MERGE INTO dim_store d
             USING staging.stores s ON d.store_id = s.store_id
             WHEN MATCHED THEN UPDATE SET store_name = UPPER(s.store_name)
             WHEN NOT MATCHED THEN INSERT (store_id, store_name) VALUES (s.store_id, s.store_name)",
        );
        let statement = &lineage[0];
        let edge = flow(statement, "staging.stores", "dim_store");
        assert_eq!(edge.operation.to_string(), "MERGE");
        assert_eq!(
            edge.column_map["store_name"].derivation.as_deref(),
            Some("UPPER(store_name)")
        );
        assert_eq!(edge.conditions, vec!["store_id = store_id"]);
    }

    #[test]
    fn upsert_resolves_excluded() {
        let lineage = extract(
            "INSERT INTO warehouse.customers (id, total)
             SELECT id, SUM(amount) FROM staging.payments GROUP BY id
             ON CONFLICT (id) DO UPDATE SET total = EXCLUDED.total, is_current = TRUE",
        );
        let statement = &lineage[0];
        let edge = flow(statement, "staging.payments", "warehouse.customers");
        assert_eq!(edge.operation.to_string(), "MERGE");
        assert_eq!(edge.column_map["total"].sources, vec!["amount"]);
        assert_eq!(
            edge.column_map["total"].derivation.as_deref(),
            Some("SUM(amount)")
        );
    }

    #[test]
    fn procedure_body_uses_local_variables() {
        let lineage = extract(
            "CREATE PROCEDURE load_orders(p_day DATE) LANGUAGE plpgsql AS $$
             BEGIN
               INSERT INTO fact_orders SELECT order_id, p_day AS load_day FROM staging.orders o JOIN src.x y ON o.id = y.id;
             END;
             $$;",
        );
        let statement = &lineage[0];
        assert_eq!(statement.kind, StatementKind::CreateProcedure);
        assert_eq!(statement.targets, vec!["load_orders"]);

        let mut inserts = vec![];
        let mut stack = statement.children.iter().collect::<Vec<_>>();
        while let Some(child) = stack.pop() {
            assert_eq!(child.procedure.as_deref(), Some("load_orders"));
            if child.kind == StatementKind::Insert {
                inserts.push(child);
            }
            stack.extend(child.children.iter());
        }
        assert_eq!(inserts.len(), 1);
        let insert = inserts[0];
        assert!(insert.warnings.iter().all(|warning| {
            !matches!(warning, Warning::UnresolvedColumn { column, .. } if column == "p_day")
        }));
        let edge = flow(insert, "staging.orders", "fact_orders");
        assert_eq!(edge.operation.to_string(), "LOAD");
    }

    #[test]
    fn select_into_variable_is_not_a_write() {
        let lineage = extract(
            "DECLARE @n INT; SELECT COUNT(*) INTO @n FROM src.t; SELECT a INTO tmp_a FROM src.t",
        );
        assert!(lineage[1].flows.is_empty());
        let edge = flow(&lineage[2], "src.t", "tmp_a");
        assert_eq!(edge.operation.to_string(), "LOAD");
    }

    #[test]
    fn syntax_errors_are_isolated() {
        let lineage = extract("INSERT INTO t SELECT FROM WHERE; INSERT INTO u SELECT a FROM src.v");
        assert_eq!(lineage[0].kind, StatementKind::Invalid);
        assert!(matches!(lineage[0].warnings[0], Warning::Syntax { .. }));
        assert_eq!(lineage[1].flows.len(), 1);
    }
}
