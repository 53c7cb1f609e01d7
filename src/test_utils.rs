use std::{collections::HashMap, fmt::Display};

use serde::Deserialize;

use crate::{dialect::Dialect, lineage::catalog::SchemaObject};

pub const PARSING_TESTS_FILE: &str = "tests/parsing_tests.toml";
pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsing {
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
    /// Expected statement count, when the case checks splitting.
    pub statements: Option<usize>,
    /// Indices of statements expected to fail parsing.
    #[serde(default)]
    pub invalid: Vec<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsingData {
    pub tests: Vec<TestParsing>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TestColumnMapping {
    pub sources: Vec<String>,
    pub derivation: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestEdge {
    pub source: String,
    pub target: String,
    pub operation: String,
    /// Subset of the column map to check.
    #[serde(default)]
    pub columns: HashMap<String, TestColumnMapping>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestNode {
    pub name: String,
    pub kind: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub schema_objects: Vec<SchemaObject>,
    /// Complete edge set of the finalized graph.
    pub edges: Vec<TestEdge>,
    #[serde(default)]
    pub nodes: Vec<TestNode>,
    /// Warning kinds, in order.
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}

impl Display for TestLineageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
