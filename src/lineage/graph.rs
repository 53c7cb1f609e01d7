use indexmap::{IndexMap, map::Entry};
use serde::Serialize;

use crate::arena::{Arena, ArenaIndex};

use super::{
    classify::{EdgeOperation, NodeKind},
    diagnostics::Warning,
    extractor::{Deduplication, NodeDeclaration, StatementKind, StatementLineage},
    scope::TableBinding,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Normalized transformation expression, `None` for a passthrough.
    pub derivation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub columns: Vec<ColumnDescriptor>,
}

impl Node {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|col| col.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    /// Columns of the source node the target column is computed from.
    pub sources: Vec<String>,
    pub derivation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source_node: String,
    pub target_node: String,
    pub operation: EdgeOperation,
    /// Target column -> source columns and derivation.
    pub column_map: IndexMap<String, ColumnMapping>,
    /// Normalized join predicates referencing the source node.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

/// Extraction summary of one statement. Procedure bodies, blocks and `IF` branches
/// own their nested statements through `children`.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRecord {
    pub index: usize,
    pub line: u32,
    pub kind: StatementKind,
    pub tables: Vec<TableBinding>,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deduplications: Vec<Deduplication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    pub children: Vec<ArenaIndex>,
}

/// Finalized lineage graph. Nodes and edges are kept in first-seen order, so the same
/// input always yields the same graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LineageGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(skip)]
    index: IndexMap<String, usize>,
    #[serde(skip)]
    statements: Arena<StatementRecord>,
    #[serde(skip)]
    roots: Vec<ArenaIndex>,
    #[serde(skip)]
    procedures: IndexMap<String, Vec<ArenaIndex>>,
}

impl LineageGraph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&idx| &self.nodes[idx])
    }

    pub fn edges_into(&self, name: &str) -> impl Iterator<Item = &Edge> {
        let name = name.trim().to_lowercase();
        self.edges
            .iter()
            .filter(move |edge| edge.target_node == name)
    }

    pub fn edges_from(&self, name: &str) -> impl Iterator<Item = &Edge> {
        let name = name.trim().to_lowercase();
        self.edges
            .iter()
            .filter(move |edge| edge.source_node == name)
    }

    /// Top-level statements, in input order.
    pub fn statements(&self) -> impl Iterator<Item = &StatementRecord> {
        self.roots.iter().map(|&idx| &self.statements[idx])
    }

    pub fn statement_roots(&self) -> &[ArenaIndex] {
        &self.roots
    }

    pub fn statement(&self, idx: ArenaIndex) -> Option<&StatementRecord> {
        self.statements.get(idx)
    }

    /// Every statement record, top-level and nested. `children` index into it.
    pub fn statement_arena(&self) -> &Arena<StatementRecord> {
        &self.statements
    }

    pub fn procedures(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(|name| name.as_str())
    }

    pub fn procedure_roots(&self) -> &IndexMap<String, Vec<ArenaIndex>> {
        &self.procedures
    }

    /// Body statements of a procedure defined in the analyzed input.
    pub fn procedure_statements(&self, name: &str) -> Vec<&StatementRecord> {
        self.procedures
            .get(&name.trim().to_lowercase())
            .map(|children| children.iter().map(|&idx| &self.statements[idx]).collect())
            .unwrap_or_default()
    }
}

fn merge_edge(kept: &mut Edge, other: Edge) -> Vec<Warning> {
    let mut warnings = vec![];
    for (column, mapping) in other.column_map {
        match kept.column_map.entry(column) {
            Entry::Vacant(entry) => {
                entry.insert(mapping);
            }
            Entry::Occupied(mut entry) => {
                let column = entry.key().clone();
                let existing = entry.get_mut();
                if existing.derivation == mapping.derivation {
                    for source in mapping.sources {
                        if !existing.sources.contains(&source) {
                            existing.sources.push(source);
                        }
                    }
                } else {
                    warnings.push(Warning::AmbiguousLineage {
                        source_node: kept.source_node.clone(),
                        target_node: kept.target_node.clone(),
                        column,
                        kept: existing.derivation.clone(),
                        ignored: mapping.derivation,
                    });
                }
            }
        }
    }
    for condition in other.conditions {
        if !kept.conditions.contains(&condition) {
            kept.conditions.push(condition);
        }
    }
    warnings
}

/// Collapses edges with the same source, target and operation into one edge whose
/// column map is the union of theirs. A column mapped with two different derivations
/// keeps the first one and yields an ambiguous lineage warning.
pub fn merge_parallel_edges(edges: Vec<Edge>) -> (Vec<Edge>, Vec<Warning>) {
    let mut merged: IndexMap<(String, String, EdgeOperation), Edge> = IndexMap::new();
    let mut warnings = vec![];
    for edge in edges {
        let key = (
            edge.source_node.clone(),
            edge.target_node.clone(),
            edge.operation,
        );
        match merged.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(edge);
            }
            Entry::Occupied(mut entry) => warnings.extend(merge_edge(entry.get_mut(), edge)),
        }
    }
    (merged.into_values().collect(), warnings)
}

/// Folds statement results, in statement order, into a [`LineageGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
    statements: Arena<StatementRecord>,
    roots: Vec<ArenaIndex>,
    procedures: IndexMap<String, Vec<ArenaIndex>>,
    warnings: Vec<Warning>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, name: &str) {
        if !self.nodes.contains_key(name) {
            self.nodes.insert(
                name.to_owned(),
                Node {
                    name: name.to_owned(),
                    kind: NodeKind::Other,
                    columns: vec![],
                },
            );
        }
    }

    /// Targets overwrite the columns they redeclare, references only add missing ones.
    /// The first kind other than `other` sticks.
    fn declare(&mut self, declaration: NodeDeclaration) {
        self.ensure_node(&declaration.name);
        let Some(node) = self.nodes.get_mut(&declaration.name) else {
            return;
        };
        if node.kind == NodeKind::Other {
            node.kind = declaration.kind;
        }
        for column in declaration.columns {
            match node.columns.iter_mut().find(|col| col.name == column.name) {
                Some(existing) => {
                    if declaration.declared {
                        *existing = column;
                    }
                }
                None => node.columns.push(column),
            }
        }
    }

    pub(crate) fn add_statement(&mut self, lineage: StatementLineage) -> ArenaIndex {
        let idx = self.add_record(lineage);
        self.roots.push(idx);
        idx
    }

    fn add_record(&mut self, lineage: StatementLineage) -> ArenaIndex {
        let StatementLineage {
            index,
            line,
            kind,
            tables,
            targets,
            nodes,
            flows,
            deduplications,
            warnings,
            error,
            procedure,
            children,
        } = lineage;

        for warning in warnings {
            log::warn!("{}", warning);
            self.warnings.push(warning);
        }
        for declaration in nodes {
            self.declare(declaration);
        }
        for edge in flows {
            self.ensure_node(&edge.source_node);
            self.ensure_node(&edge.target_node);
            self.edges.push(edge);
        }

        let defined_procedure = match kind {
            StatementKind::CreateProcedure => targets.first().cloned(),
            _ => None,
        };
        let record_idx = self.statements.allocate(StatementRecord {
            index,
            line,
            kind,
            tables,
            targets,
            deduplications,
            error,
            procedure,
            children: vec![],
        });
        for child in children {
            let child_idx = self.add_record(child);
            self.statements[record_idx].children.push(child_idx);
        }
        if let Some(name) = defined_procedure {
            let children = self.statements[record_idx].children.clone();
            self.procedures.insert(name, children);
        }
        record_idx
    }

    pub fn finalize(self) -> (LineageGraph, Vec<Warning>) {
        let (edges, conflicts) = merge_parallel_edges(self.edges);
        let mut warnings = self.warnings;
        for warning in conflicts {
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let nodes = self.nodes.into_values().collect::<Vec<_>>();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.name.clone(), idx))
            .collect();
        log::debug!(
            "Finalized lineage graph with {} nodes and {} edges",
            nodes.len(),
            edges.len()
        );

        let graph = LineageGraph {
            nodes,
            edges,
            index,
            statements: self.statements,
            roots: self.roots,
            procedures: self.procedures,
        };
        (graph, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str, columns: &[(&str, &str, Option<&str>)]) -> Edge {
        Edge {
            source_node: source.to_owned(),
            target_node: target.to_owned(),
            operation: EdgeOperation::Transform,
            column_map: columns
                .iter()
                .map(|(target_col, source_col, derivation)| {
                    (
                        target_col.to_string(),
                        ColumnMapping {
                            sources: vec![source_col.to_string()],
                            derivation: derivation.map(|text| text.to_owned()),
                        },
                    )
                })
                .collect(),
            conditions: vec![],
        }
    }

    #[test]
    fn merges_parallel_edges_idempotently() {
        let edges = vec![
            edge("a", "b", &[("x", "x", None)]),
            edge("a", "b", &[("y", "y", Some("UPPER(y)"))]),
            edge("a", "c", &[("x", "x", None)]),
        ];
        let (merged, warnings) = merge_parallel_edges(edges);
        assert!(warnings.is_empty());
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0].column_map.keys().collect::<Vec<_>>(),
            vec!["x", "y"]
        );

        let doubled = merged.iter().chain(merged.iter()).cloned().collect();
        let (merged_again, warnings) = merge_parallel_edges(doubled);
        assert!(warnings.is_empty());
        assert_eq!(merged_again, merged);
    }

    #[test]
    fn conflicting_derivations_keep_the_first() {
        let edges = vec![
            edge("a", "b", &[("x", "x", Some("UPPER(x)"))]),
            edge("a", "b", &[("x", "x", Some("LOWER(x)"))]),
        ];
        let (merged, warnings) = merge_parallel_edges(edges);
        assert_eq!(
            merged[0].column_map["x"].derivation.as_deref(),
            Some("UPPER(x)")
        );
        assert_eq!(
            warnings,
            vec![Warning::AmbiguousLineage {
                source_node: "a".to_owned(),
                target_node: "b".to_owned(),
                column: "x".to_owned(),
                kept: Some("UPPER(x)".to_owned()),
                ignored: Some("LOWER(x)".to_owned()),
            }]
        );
    }

    #[test]
    fn declarations_merge_columns_and_kinds() {
        let mut builder = GraphBuilder::new();
        let column = |name: &str, derivation: Option<&str>| ColumnDescriptor {
            name: name.to_owned(),
            derivation: derivation.map(|text| text.to_owned()),
        };
        builder.declare(NodeDeclaration {
            name: "t".to_owned(),
            kind: NodeKind::Other,
            columns: vec![column("a", None)],
            declared: false,
        });
        builder.declare(NodeDeclaration {
            name: "t".to_owned(),
            kind: NodeKind::Fact,
            columns: vec![column("a", Some("TRIM(a)")), column("b", None)],
            declared: true,
        });
        builder.declare(NodeDeclaration {
            name: "t".to_owned(),
            kind: NodeKind::Staging,
            columns: vec![column("a", None)],
            declared: false,
        });

        let (graph, _) = builder.finalize();
        let node = graph.node(" T ").unwrap();
        assert_eq!(node.kind, NodeKind::Fact);
        assert_eq!(
            node.columns,
            vec![column("a", Some("TRIM(a)")), column("b", None)]
        );
    }
}
