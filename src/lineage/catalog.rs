use std::collections::HashSet;

use anyhow::anyhow;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub dtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaObject {
    pub name: String, // schema.name uid
    pub kind: SchemaObjectKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaObjectKind {
    Table { columns: Vec<Column> },
    View { columns: Vec<Column> },
}

impl SchemaObjectKind {
    pub fn columns(&self) -> &[Column] {
        match self {
            SchemaObjectKind::Table { columns } | SchemaObjectKind::View { columns } => columns,
        }
    }
}

/// Known schema objects, used to expand `*` and to resolve unqualified columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub schema_objects: Vec<SchemaObject>,
}

impl Catalog {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rejects duplicate object names and duplicate columns within one object.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for schema_object in &self.schema_objects {
            let name = schema_object.name.trim().to_lowercase();
            if !names.insert(name) {
                return Err(anyhow!(
                    "Found duplicate definition of schema object `{}`.",
                    schema_object.name
                ));
            }

            let mut unique_columns = HashSet::new();
            let duplicate_columns = schema_object
                .kind
                .columns()
                .iter()
                .filter(|col| !unique_columns.insert(col.name.trim().to_lowercase()))
                .map(|col| col.name.as_str())
                .collect::<Vec<_>>();
            if !duplicate_columns.is_empty() {
                return Err(anyhow!(
                    "Found duplicate columns in schema object `{}`: `{:?}`.",
                    &schema_object.name,
                    duplicate_columns
                ));
            }
        }
        Ok(())
    }

    /// Normalized object name -> normalized column names.
    pub(crate) fn column_map(&self) -> IndexMap<String, Vec<String>> {
        self.schema_objects
            .iter()
            .map(|schema_object| {
                (
                    schema_object.name.trim().to_lowercase(),
                    schema_object
                        .kind
                        .columns()
                        .iter()
                        .map(|col| col.name.trim().to_lowercase())
                        .collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_columns() {
        let json = r#"{"schema_objects": [
            {"name": "src.t", "kind": {"table": {"columns": [{"name": "id"}, {"name": "ID"}]}}}
        ]}"#;
        let err = Catalog::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("duplicate columns"));
    }

    #[test]
    fn normalizes_column_map() {
        let json = r#"{"schema_objects": [
            {"name": "Src.T", "kind": {"view": {"columns": [{"name": "Id", "dtype": "int"}]}}}
        ]}"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        assert_eq!(
            catalog.column_map().get("src.t"),
            Some(&vec!["id".to_owned()])
        );
    }
}
