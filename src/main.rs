use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use indexmap::IndexMap;
use serde::Serialize;
use sqlflow::arena::{Arena, ArenaIndex};
use sqlflow::config::AnalyzerConfig;
use sqlflow::dialect::Dialect;
use sqlflow::lineage::diagnostics::Warning;
use sqlflow::lineage::graph::{Edge, LineageGraph, Node, StatementRecord};
use sqlflow::lineage::{analyze_file, catalog::Catalog};
use std::time::Instant;

#[derive(clap::Parser)]
#[command(name = "sqlflow")]
#[command(about = "ETL SQL data-flow lineage extractor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract lineage from one or more SQL files.
    ExtractLineage(LineageCommand),
}

#[derive(clap::Args)]
struct LineageCommand {
    /// Path to the SQL file or directory containing SQL files.
    #[arg(value_name = "SQL_[FILE|DIR]")]
    sql: PathBuf,
    /// Path to a TOML file with analysis settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path to a JSON file containing known schema objects.
    #[arg(short, long)]
    catalog: Option<PathBuf>,
    /// SQL dialect hint.
    #[arg(short, long, value_enum)]
    dialect: Option<Dialect>,
    /// Extract statements in parallel.
    #[arg(long)]
    parallel: bool,
    /// Include per-statement extraction records in the output.
    #[arg(long)]
    include_statements: bool,
    /// Pretty-print the output lineage.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutLineage {
    Ok(OkLineage),
    ErrLineage { error: String },
}

#[derive(Serialize)]
struct OkLineage {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    statements: Option<OutStatements>,
}

#[derive(Serialize)]
struct OutStatements {
    arena: Arena<StatementRecord>,
    roots: Vec<ArenaIndex>,
    procedures: IndexMap<String, Vec<ArenaIndex>>,
}

impl From<&LineageGraph> for OutStatements {
    fn from(graph: &LineageGraph) -> Self {
        Self {
            arena: graph.statement_arena().clone(),
            roots: graph.statement_roots().to_vec(),
            procedures: graph.procedure_roots().clone(),
        }
    }
}

fn load_config(lineage_command: &LineageCommand) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match &lineage_command.config {
        Some(path) => AnalyzerConfig::from_toml_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(catalog_path) = &lineage_command.catalog {
        let json = std::fs::read_to_string(catalog_path).map_err(|_| {
            anyhow!(
                "Failed to read catalog file: {}",
                catalog_path.display().to_string()
            )
        })?;
        config.catalog = Catalog::from_json_str(&json).map_err(|err| {
            anyhow!(
                "Failed to parse JSON catalog in file {} due to error: {}",
                catalog_path.display().to_string(),
                err
            )
        })?;
    }
    if let Some(dialect) = lineage_command.dialect {
        config.dialect = dialect;
    }
    config.parallel |= lineage_command.parallel;
    Ok(config)
}

fn output_lineage(
    lineage_command: &LineageCommand,
    config: &AnalyzerConfig,
    sql_file_path: &Path,
) -> OutLineage {
    match analyze_file(sql_file_path, config) {
        Ok(analysis) => OutLineage::Ok(OkLineage {
            statements: if lineage_command.include_statements {
                Some(OutStatements::from(&analysis.graph))
            } else {
                None
            },
            nodes: analysis.graph.nodes().to_vec(),
            edges: analysis.graph.edges().to_vec(),
            warnings: analysis.warnings,
        }),
        Err(err) => OutLineage::ErrLineage {
            error: format!(
                "Could not extract lineage from SQL in file {} due to error: {}",
                sql_file_path.display(),
                err
            ),
        },
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::ExtractLineage(lineage_command) => {
            let config = load_config(lineage_command)?;
            let sql_file_or_dir = &lineage_command.sql;
            let out_str = if sql_file_or_dir.is_dir() {
                let mut file_lineages: IndexMap<String, OutLineage> = IndexMap::new();
                let mut sql_in_dir: Vec<_> = std::fs::read_dir(sql_file_or_dir)?
                    .filter_map(|res| res.ok())
                    .map(|entry| entry.path())
                    .filter(|file| file.extension().is_some_and(|ext| ext == "sql"))
                    .collect();
                sql_in_dir.sort();

                for sql_file in sql_in_dir {
                    let output_lineage = output_lineage(lineage_command, &config, &sql_file);
                    file_lineages.insert(
                        std::path::absolute(sql_file)?.display().to_string(),
                        output_lineage,
                    );
                }
                to_json(&file_lineages, lineage_command.pretty)?
            } else {
                let output_lineage = output_lineage(lineage_command, &config, sql_file_or_dir);
                to_json(&output_lineage, lineage_command.pretty)?
            };
            println!("{}", out_str);
        }
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
