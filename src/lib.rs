//! # sqlflow
//!
//! A library for extracting table- and column-level data-flow lineage from ETL SQL scripts.
//!
//! # Features
//!
//! - Parse multi-statement SQL scripts, including stored-procedure bodies, into a tagged-variant AST.
//! - Resolve CTE chains, aliases, derived tables and correlated subqueries.
//! - Track, for every written column, the source columns it comes from and the normalized expression deriving it.
//! - Classify every flow as `EXTRACT`, `TRANSFORM`, `LOAD` or `MERGE` and fold all statements into one deduplicated graph.
//! - Never abort on a bad statement: syntax and scope problems are reported as warnings next to the graph.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlflow::{config::AnalyzerConfig, dialect::Dialect, lineage::analyze};
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let sql = r#"
//!         WITH extracted_customers AS (
//!             SELECT customer_id, first_name, last_name FROM source_db.customers
//!         )
//!         INSERT INTO warehouse.customers (customer_id, customer_name)
//!         SELECT customer_id, CONCAT(first_name, ' ', last_name)
//!         FROM extracted_customers;
//!     "#;
//!     let config = AnalyzerConfig {
//!         dialect: Dialect::Postgres,
//!         ..Default::default()
//!     };
//!     let analysis = analyze(sql, &config)?;
//!
//!     for edge in analysis.graph.edges() {
//!         println!(
//!             "{} -[{}]-> {}: {:?}",
//!             edge.source_node, edge.operation, edge.target_node, edge.column_map
//!         );
//!     }
//!     for warning in &analysis.warnings {
//!         println!("warning: {}", warning);
//!     }
//!     Ok(())
//! }
//! ```
pub mod arena;
pub mod ast;
pub mod config;
pub mod dialect;
pub mod lineage;
pub mod parser;
pub mod scanner;
pub mod splitter;
pub mod test_utils;
