use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use strum_macros::Display;

use crate::ast::ObjectName;

use super::expression::{RowNumberWindow, UNRESOLVED};

/// A column of a node that an output column is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ColumnOrigin {
    pub node: String,
    pub column: String,
}

/// Where a column comes from and how: `derivation` is `None` for a passthrough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ColumnLineage {
    pub sources: IndexSet<ColumnOrigin>,
    pub derivation: Option<String>,
}

impl ColumnLineage {
    pub fn passthrough(node: &str, column: &str) -> Self {
        Self {
            sources: IndexSet::from([ColumnOrigin {
                node: node.to_owned(),
                column: column.to_owned(),
            }]),
            derivation: None,
        }
    }

    pub fn unresolved(sources: IndexSet<ColumnOrigin>) -> Self {
        Self {
            sources,
            derivation: Some(UNRESOLVED.to_owned()),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.derivation.as_deref() == Some(UNRESOLVED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputColumn {
    pub name: String,
    pub lineage: ColumnLineage,
}

/// How a table reference was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BindingKind {
    /// External object, not a CTE of the enclosing `WITH` chains.
    Source,
    /// CTE defined earlier in an enclosing `WITH` chain.
    Cte,
    /// Forward or non-recursive self reference to a CTE.
    Unknown,
}

/// A table reference of a statement together with its alias and binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableBinding {
    pub object: String,
    pub alias: Option<String>,
    pub binding: BindingKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Binding {
    Node(String),
    Derived,
    Function,
    Unknown,
}

/// A relation of a `FROM` clause as seen by column resolution.
#[derive(Debug, Clone)]
pub(crate) struct Relation {
    pub alias: Option<String>,
    pub name: Option<String>,
    pub binding: Binding,
    /// `None` when the columns of the relation are not known.
    pub columns: Option<Vec<OutputColumn>>,
    /// `ROW_NUMBER()` columns of the relation.
    pub row_numbers: IndexMap<String, RowNumberWindow>,
    /// Nodes a derived table with unknown columns selects `*` from.
    pub passthrough_nodes: Vec<String>,
}

impl Relation {
    pub fn new(binding: Binding, alias: Option<String>) -> Self {
        let name = match &binding {
            Binding::Node(name) => Some(name.clone()),
            _ => None,
        };
        Self {
            alias,
            name,
            binding,
            columns: None,
            row_numbers: IndexMap::new(),
            passthrough_nodes: vec![],
        }
    }

    pub fn node(&self) -> Option<&str> {
        match &self.binding {
            Binding::Node(name) => Some(name),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        self.alias
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("derived table")
    }

    fn column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.as_ref()?.iter().find(|col| col.name == name)
    }

    /// Lineage of a column of a relation whose columns are not known.
    fn unknown_column(&self, column: &str) -> ColumnLineage {
        match &self.binding {
            Binding::Node(node) => ColumnLineage::passthrough(node, column),
            Binding::Derived => ColumnLineage {
                sources: self
                    .passthrough_nodes
                    .iter()
                    .map(|node| ColumnOrigin {
                        node: node.clone(),
                        column: column.to_owned(),
                    })
                    .collect(),
                derivation: None,
            },
            Binding::Function | Binding::Unknown => ColumnLineage::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Found(ColumnLineage),
    Variable,
    Unresolved(String),
    UndefinedQualifier(String),
}

/// Relations visible to the expressions of one select, chained to the scope of the
/// enclosing query for correlated subqueries.
#[derive(Debug)]
pub(crate) struct Scope<'a> {
    pub relations: Vec<Relation>,
    parent: Option<&'a Scope<'a>>,
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

impl<'a> Scope<'a> {
    pub fn new(relations: Vec<Relation>, parent: Option<&'a Scope<'a>>) -> Self {
        Self { relations, parent }
    }

    /// Looks a qualifier up by alias, then by full object name, then by the last
    /// segment of the object name, from the innermost scope outwards.
    pub fn find_relation(&self, qualifier: &ObjectName) -> Option<&Relation> {
        let qualifier_name = qualifier.normalized();
        let mut current = Some(self);
        while let Some(scope) = current {
            let relation = scope
                .relations
                .iter()
                .find(|rel| rel.alias.as_deref() == Some(qualifier_name.as_str()))
                .or_else(|| {
                    scope
                        .relations
                        .iter()
                        .find(|rel| rel.name.as_deref() == Some(qualifier_name.as_str()))
                })
                .or_else(|| {
                    scope.relations.iter().find(|rel| {
                        qualifier.parts.len() == 1
                            && rel
                                .name
                                .as_deref()
                                .is_some_and(|name| last_segment(name) == qualifier_name)
                    })
                });
            if relation.is_some() {
                return relation;
            }
            current = scope.parent;
        }
        None
    }

    /// Resolves a column reference. Unqualified names are looked up one scope level at a
    /// time, innermost first: the relation whose known columns contain them, then a
    /// variable, then the only relation of that level whose columns are unknown.
    pub fn resolve(&self, name: &ObjectName, is_variable: impl Fn(&str) -> bool) -> Resolution {
        let column = name
            .last()
            .map(|ident| ident.normalized())
            .unwrap_or_default();

        if let Some(qualifier) = name.qualifier() {
            let Some(relation) = self.find_relation(&qualifier) else {
                return Resolution::UndefinedQualifier(qualifier.normalized());
            };
            return match (&relation.columns, relation.column(&column)) {
                (_, Some(col)) => Resolution::Found(col.lineage.clone()),
                (Some(_), None) => Resolution::Unresolved(format!(
                    "column not found in `{}`",
                    relation.label()
                )),
                (None, None) => Resolution::Found(relation.unknown_column(&column)),
            };
        }

        let mut current = Some(self);
        while let Some(scope) = current {
            let matches = scope
                .relations
                .iter()
                .filter_map(|rel| rel.column(&column))
                .collect::<Vec<_>>();
            if let Some(first) = matches.first() {
                // USING/NATURAL joins expose the same column on both sides
                let mut lineage = first.lineage.clone();
                for other in &matches[1..] {
                    lineage.sources.extend(other.lineage.sources.iter().cloned());
                }
                return Resolution::Found(lineage);
            }

            let unknown = scope
                .relations
                .iter()
                .filter(|rel| rel.columns.is_none())
                .collect::<Vec<_>>();
            if !unknown.is_empty() && is_variable(&column) {
                return Resolution::Variable;
            }
            match unknown.as_slice() {
                [] => {}
                [relation] => return Resolution::Found(relation.unknown_column(&column)),
                relations => {
                    return Resolution::Unresolved(format!(
                        "could belong to any of {}",
                        relations
                            .iter()
                            .map(|rel| format!("`{}`", rel.label()))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
            }
            current = scope.parent;
        }

        if is_variable(&column) {
            return Resolution::Variable;
        }

        Resolution::Unresolved("not found in any relation in scope".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ident;

    fn object_name(name: &str) -> ObjectName {
        ObjectName {
            parts: name.split('.').map(Ident::new).collect(),
        }
    }

    fn known(node: &str, alias: &str, columns: &[&str]) -> Relation {
        let mut relation = Relation::new(Binding::Node(node.to_owned()), Some(alias.to_owned()));
        relation.columns = Some(
            columns
                .iter()
                .map(|col| OutputColumn {
                    name: col.to_string(),
                    lineage: ColumnLineage::passthrough(node, col),
                })
                .collect(),
        );
        relation
    }

    #[test]
    fn resolves_qualified_columns() {
        let scope = Scope::new(
            vec![
                known("cleaned", "c", &["id", "name"]),
                Relation::new(Binding::Node("staging.orders".to_owned()), None),
            ],
            None,
        );
        assert_eq!(
            scope.resolve(&object_name("c.name"), |_| false),
            Resolution::Found(ColumnLineage::passthrough("cleaned", "name"))
        );
        assert_eq!(
            scope.resolve(&object_name("orders.amount"), |_| false),
            Resolution::Found(ColumnLineage::passthrough("staging.orders", "amount"))
        );
        assert_eq!(
            scope.resolve(&object_name("x.amount"), |_| false),
            Resolution::UndefinedQualifier("x".to_owned())
        );
        assert!(matches!(
            scope.resolve(&object_name("c.missing"), |_| false),
            Resolution::Unresolved(_)
        ));
    }

    #[test]
    fn resolves_unqualified_columns_in_order() {
        let outer = Scope::new(vec![known("customers", "cu", &["region"])], None);
        let scope = Scope::new(
            vec![
                known("cleaned", "c", &["id"]),
                Relation::new(Binding::Node("orders".to_owned()), Some("o".to_owned())),
            ],
            Some(&outer),
        );
        let is_variable = |name: &str| name == "v_batch";

        assert_eq!(
            scope.resolve(&object_name("id"), is_variable),
            Resolution::Found(ColumnLineage::passthrough("cleaned", "id"))
        );
        assert_eq!(
            scope.resolve(&object_name("region"), is_variable),
            Resolution::Found(ColumnLineage::passthrough("orders", "region"))
        );
        assert_eq!(
            scope.resolve(&object_name("v_batch"), is_variable),
            Resolution::Variable
        );
        assert_eq!(
            scope.resolve(&object_name("amount"), is_variable),
            Resolution::Found(ColumnLineage::passthrough("orders", "amount"))
        );
    }

    #[test]
    fn inner_unknown_relation_shadows_outer_columns() {
        let outer = Scope::new(vec![known("c", "c", &["id", "amt"])], None);
        let inner = Scope::new(
            vec![Relation::new(Binding::Node("raw.b".to_owned()), None)],
            Some(&outer),
        );
        assert_eq!(
            inner.resolve(&object_name("amt"), |_| false),
            Resolution::Found(ColumnLineage::passthrough("raw.b", "amt"))
        );

        let correlated = Scope::new(vec![known("raw.b", "b", &["amt"])], Some(&outer));
        assert_eq!(
            correlated.resolve(&object_name("id"), |_| false),
            Resolution::Found(ColumnLineage::passthrough("c", "id"))
        );
    }

    #[test]
    fn ambiguous_unknown_relations_are_unresolved() {
        let scope = Scope::new(
            vec![
                Relation::new(Binding::Node("a".to_owned()), None),
                Relation::new(Binding::Node("b".to_owned()), None),
            ],
            None,
        );
        assert_eq!(
            scope.resolve(&object_name("x"), |_| false),
            Resolution::Unresolved("could belong to any of `a`, `b`".to_owned())
        );
    }
}
