use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Semantic role tag of a node, used by renderers and by edge classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Source,
    Staging,
    Transform,
    Fact,
    Dimension,
    Mart,
    Warehouse,
    Audit,
    Procedure,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeOperation {
    Extract,
    Transform,
    Load,
    Merge,
}

/// How a statement refers to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeRole {
    Reference,
    Cte,
    View,
    Temporary,
    Table,
    Procedure,
}

/// Statement construct that writes into a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Cte,
    View,
    MaterializedView,
    Insert,
    Ctas,
    SelectInto,
    Merge,
    Upsert,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadKind {
    /// Leftmost `FROM` relation of the final select or the `MERGE ... USING` source.
    Primary,
    Secondary,
}

fn kind_from_word(word: &str) -> Option<NodeKind> {
    let kind = match word {
        "source" | "sources" | "src" | "raw" => NodeKind::Source,
        "staging" | "stg" | "stage" => NodeKind::Staging,
        "fact" | "facts" | "fct" => NodeKind::Fact,
        "mart" | "marts" | "datamart" => NodeKind::Mart,
        "warehouse" | "dwh" | "dw" => NodeKind::Warehouse,
        "audit" => NodeKind::Audit,
        "proc" | "procedure" => NodeKind::Procedure,
        _ => return None,
    };
    Some(kind)
}

fn is_dimension_segment(segment: &str) -> bool {
    segment.starts_with("dim_") || matches!(segment, "dim" | "dimension" | "dimensions")
}

fn kind_from_segment(segment: &str) -> Option<NodeKind> {
    let segment = segment.trim_start_matches('#');
    if is_dimension_segment(segment) {
        return Some(NodeKind::Dimension);
    }
    segment.split('_').find_map(kind_from_word)
}

/// Naming heuristic: the object name itself is checked first, then its schema
/// qualifiers from the innermost outwards.
pub(crate) fn kind_from_name(name: &str) -> Option<NodeKind> {
    name.rsplit('.').find_map(kind_from_segment)
}

pub(crate) fn is_staging_name(name: &str) -> bool {
    kind_from_name(name) == Some(NodeKind::Staging)
}

/// `dim_*` objects, the targets of dimension upserts.
fn is_dimension_name(name: &str) -> bool {
    let object = name.rsplit('.').next().unwrap_or(name);
    object.trim_start_matches('#').starts_with("dim_")
}

pub(crate) fn node_kind(name: &str, role: NodeRole, dedup: bool) -> NodeKind {
    if dedup {
        return NodeKind::Transform;
    }
    if role == NodeRole::Procedure {
        return NodeKind::Procedure;
    }
    if let Some(kind) = kind_from_name(name) {
        return kind;
    }
    match role {
        NodeRole::Cte => NodeKind::Transform,
        NodeRole::View | NodeRole::Temporary => NodeKind::Staging,
        _ => NodeKind::Other,
    }
}

/// Facts about one `source -> target` flow of a statement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Flow<'a> {
    pub target: &'a str,
    pub target_role: NodeRole,
    pub write: WriteKind,
    pub read: ReadKind,
    pub dedup: bool,
    pub scd: bool,
    /// Whether the source is a CTE, a write target or a staging object anywhere in the run.
    pub source_defined_in_run: bool,
}

impl Flow<'_> {
    fn is_staging_target(&self) -> bool {
        matches!(
            self.target_role,
            NodeRole::Cte | NodeRole::View | NodeRole::Temporary
        ) || is_staging_name(self.target)
    }

    /// First matching rule wins.
    pub(crate) fn operation(&self) -> EdgeOperation {
        if self.dedup {
            return EdgeOperation::Transform;
        }
        if self.is_staging_target() && !self.source_defined_in_run {
            return EdgeOperation::Extract;
        }
        if self.read == ReadKind::Primary {
            if matches!(self.write, WriteKind::Merge | WriteKind::Upsert)
                && (is_dimension_name(self.target) || self.scd)
            {
                return EdgeOperation::Merge;
            }
            if matches!(
                self.write,
                WriteKind::Insert
                    | WriteKind::Ctas
                    | WriteKind::MaterializedView
                    | WriteKind::SelectInto
                    | WriteKind::Merge
                    | WriteKind::Upsert
            ) && self.target_role == NodeRole::Table
                && !self.is_staging_target()
            {
                return EdgeOperation::Load;
            }
        }
        EdgeOperation::Transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(target: &str, target_role: NodeRole, write: WriteKind) -> Flow<'_> {
        Flow {
            target,
            target_role,
            write,
            read: ReadKind::Primary,
            dedup: false,
            scd: false,
            source_defined_in_run: true,
        }
    }

    #[test]
    fn classifies_node_names() {
        assert_eq!(kind_from_name("source_db.customers"), Some(NodeKind::Source));
        assert_eq!(kind_from_name("staging.orders"), Some(NodeKind::Staging));
        assert_eq!(kind_from_name("mart.dim_store"), Some(NodeKind::Dimension));
        assert_eq!(kind_from_name("dim.stores"), Some(NodeKind::Dimension));
        assert_eq!(kind_from_name("customer_dim"), None);
        assert_eq!(kind_from_name("mart.orders_dim_backup"), Some(NodeKind::Mart));
        assert_eq!(kind_from_name("#stg_orders"), Some(NodeKind::Staging));
        assert_eq!(kind_from_name("extracted_customers"), None);
        assert_eq!(
            node_kind("extracted_customers", NodeRole::Cte, false),
            NodeKind::Transform
        );
        assert_eq!(
            node_kind("staging.orders", NodeRole::Reference, true),
            NodeKind::Transform
        );
        assert_eq!(node_kind("orders", NodeRole::Table, false), NodeKind::Other);
    }

    #[test]
    fn classification_order() {
        let mut extract = flow("extracted", NodeRole::Cte, WriteKind::Cte);
        extract.source_defined_in_run = false;
        assert_eq!(extract.operation(), EdgeOperation::Extract);

        let merge = flow("dim_store", NodeRole::Table, WriteKind::Merge);
        assert_eq!(merge.operation(), EdgeOperation::Merge);

        let merge_into_table = flow("customer_dim", NodeRole::Table, WriteKind::Merge);
        assert_eq!(merge_into_table.operation(), EdgeOperation::Load);

        let mut scd = flow("customers", NodeRole::Table, WriteKind::Upsert);
        scd.scd = true;
        assert_eq!(scd.operation(), EdgeOperation::Merge);

        let load = flow("warehouse.orders", NodeRole::Table, WriteKind::Insert);
        assert_eq!(load.operation(), EdgeOperation::Load);

        let mut secondary = flow("warehouse.orders", NodeRole::Table, WriteKind::Insert);
        secondary.read = ReadKind::Secondary;
        assert_eq!(secondary.operation(), EdgeOperation::Transform);

        let update = flow("warehouse.orders", NodeRole::Table, WriteKind::Update);
        assert_eq!(update.operation(), EdgeOperation::Transform);

        let mut dedup = flow("deduped", NodeRole::Cte, WriteKind::Cte);
        dedup.dedup = true;
        dedup.source_defined_in_run = false;
        assert_eq!(dedup.operation(), EdgeOperation::Transform);
    }

    #[test]
    fn renders_operations_upper_case() {
        assert_eq!(EdgeOperation::Extract.to_string(), "EXTRACT");
        assert_eq!(NodeKind::Dimension.as_ref(), "dimension");
        assert_eq!(
            serde_json::to_value(EdgeOperation::Merge).unwrap(),
            serde_json::json!("MERGE")
        );
    }
}
