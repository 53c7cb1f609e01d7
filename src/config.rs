use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::{dialect::Dialect, lineage::catalog::Catalog};

/// Analysis settings, usually loaded from a `sqlflow.toml` file:
///
/// ```toml
/// dialect = "postgres"
/// parallel = true
///
/// [[catalog.schema_objects]]
/// name = "source_db.customers"
/// kind = { table = { columns = [{ name = "id" }, { name = "first_name" }] } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub dialect: Dialect,
    /// Extract top-level statements on the rayon thread pool.
    pub parallel: bool,
    pub catalog: Catalog,
}

impl AnalyzerConfig {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: AnalyzerConfig = toml::from_str(toml_str)?;
        config.catalog.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|_| {
            anyhow!(
                "Failed to read config file: {}",
                path.display().to_string()
            )
        })?;
        Self::from_toml_str(&contents).map_err(|err| {
            anyhow!(
                "Failed to parse TOML config in file {} due to error: {}",
                path.display(),
                err
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_config_with_defaults() {
        let config = AnalyzerConfig::from_toml_str("dialect = \"tsql\"").unwrap();
        assert_eq!(config.dialect, Dialect::Tsql);
        assert!(!config.parallel);
        assert!(config.catalog.schema_objects.is_empty());
    }

    #[test]
    fn loads_catalog_section() {
        let config = AnalyzerConfig::from_toml_str(
            r#"
            parallel = true

            [[catalog.schema_objects]]
            name = "source_db.customers"
            kind = { table = { columns = [{ name = "id" }, { name = "email", dtype = "TEXT" }] } }
            "#,
        )
        .unwrap();
        assert!(config.parallel);
        assert_eq!(config.catalog.schema_objects[0].kind.columns().len(), 2);
    }

    #[test]
    fn rejects_duplicate_catalog_objects() {
        let result = AnalyzerConfig::from_toml_str(
            r#"
            [[catalog.schema_objects]]
            name = "t"
            kind = { table = { columns = [] } }

            [[catalog.schema_objects]]
            name = "T"
            kind = { view = { columns = [] } }
            "#,
        );
        assert!(result.is_err());
    }
}
