pub mod catalog;
pub mod classify;
pub mod context;
pub mod diagnostics;
pub mod expression;
pub mod extractor;
pub mod graph;
pub mod scope;

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::{ast::ParsedStatement, config::AnalyzerConfig, parser::parse_statements};

use catalog::Catalog;
use context::RunContext;
use diagnostics::{FatalInputError, Warning};
use extractor::{StatementLineage, extract_statement};
use graph::{GraphBuilder, LineageGraph};

/// Result of one analysis run: the finalized graph and every warning recorded while
/// building it, in statement order.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub graph: LineageGraph,
    pub warnings: Vec<Warning>,
}

/// Extracts the lineage graph of a sequence of parsed statements.
///
/// Statements are extracted independently against a shared [`RunContext`] (in parallel
/// when `parallel` is set) and folded into the graph in statement order, so the result
/// does not depend on scheduling.
pub fn extract_lineage(
    statements: &[ParsedStatement],
    catalog: &Catalog,
    parallel: bool,
) -> Analysis {
    let ctx = RunContext::build(statements, catalog);

    let lineages: Vec<StatementLineage> = if parallel {
        statements
            .par_iter()
            .map(|parsed| extract_statement(parsed, &ctx))
            .collect()
    } else {
        statements
            .iter()
            .map(|parsed| extract_statement(parsed, &ctx))
            .collect()
    };

    let mut builder = GraphBuilder::new();
    for lineage in lineages {
        builder.add_statement(lineage);
    }
    let (graph, warnings) = builder.finalize();
    Analysis { graph, warnings }
}

/// Parses and analyzes a SQL source. Only empty input is fatal: syntax errors are
/// reported as warnings and the affected statements are skipped.
pub fn analyze(sql: &str, config: &AnalyzerConfig) -> Result<Analysis, FatalInputError> {
    let statements = parse_statements(sql, config.dialect).collect::<Vec<_>>();
    if statements.is_empty() {
        return Err(FatalInputError::Empty);
    }
    log::debug!("Parsed {} top-level statements.", statements.len());
    Ok(extract_lineage(&statements, &config.catalog, config.parallel))
}

pub fn analyze_file(
    path: impl AsRef<Path>,
    config: &AnalyzerConfig,
) -> Result<Analysis, FatalInputError> {
    let path = path.as_ref();
    let sql = std::fs::read_to_string(path).map_err(|error| FatalInputError::Unreadable {
        path: path.display().to_string(),
        error,
    })?;
    analyze(&sql, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_fatal() {
        let config = AnalyzerConfig::default();
        assert!(matches!(
            analyze("  -- nothing here\n ;; ", &config),
            Err(FatalInputError::Empty)
        ));
        assert!(matches!(
            analyze_file("does/not/exist.sql", &config),
            Err(FatalInputError::Unreadable { .. })
        ));
    }

    #[test]
    fn parallel_extraction_matches_sequential() {
        let sql = "
            WITH a AS (SELECT id, amount FROM raw.payments)
            INSERT INTO fact_payments SELECT id, amount * 100 AS cents FROM a;
            INSERT INTO fact_payments SELECT id, amount * 100 AS cents FROM stg_payments;
            MERGE INTO dim_customer d USING staging.customers s ON d.id = s.id
            WHEN MATCHED THEN UPDATE SET name = s.name;
        ";
        let sequential = analyze(sql, &AnalyzerConfig::default()).unwrap();
        let parallel = analyze(
            sql,
            &AnalyzerConfig {
                parallel: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&sequential).unwrap(),
            serde_json::to_string(&parallel).unwrap()
        );
    }
}
