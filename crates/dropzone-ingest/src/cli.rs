//! Command-line interface

use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use dropzone_common::Category;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::{IngestConfig, SourceConfig};
use crate::error::{IngestError, Result};
use crate::ledger::{CsvLedgerStore, LedgerStore};
use crate::loader::{MemoryTableWriter, PgTableWriter, TableWriter};
use crate::orchestrator::{IngestionOutcome, Orchestrator, RunSummary};

/// Longest `--every` interval, one year
pub const MAX_EVERY_MINUTES: u64 = 365 * 24 * 60;

#[derive(Parser, Debug)]
#[command(name = "dropzone")]
#[command(author, version, about = "Idempotent folder-to-database CSV ingestion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./dropzone.toml when present)
    #[arg(short, long, env = "DROPZONE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print the CLI reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest new or changed files from the configured sources
    Run {
        /// Only run the named sources (repeatable)
        #[arg(short, long = "source", value_name = "NAME")]
        sources: Vec<String>,

        /// Load into memory only; database, ledger and run log are untouched
        #[arg(long)]
        dry_run: bool,

        /// Repeat the run every N minutes (at most one year) until interrupted
        #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..=MAX_EVERY_MINUTES))]
        every: Option<u64>,

        /// Print summaries as JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// List ledger entries
    Ledger {
        /// Only show entries for this category
        #[arg(long)]
        category: Option<Category>,
    },

    /// List configured sources
    Sources,
}

/// Execute a parsed command
pub async fn execute(config: &IngestConfig, command: &Commands) -> Result<()> {
    match command {
        Commands::Run {
            sources,
            dry_run,
            every,
            json,
        } => run(config, sources, *dry_run, *every, *json).await,
        Commands::Ledger { category } => show_ledger(config, *category),
        Commands::Sources => {
            show_sources(config);
            Ok(())
        },
    }
}

async fn run(
    config: &IngestConfig,
    names: &[String],
    dry_run: bool,
    every: Option<u64>,
    json: bool,
) -> Result<()> {
    let sources = select_sources(config, names)?;
    let writer: Arc<dyn TableWriter> = if dry_run {
        info!("Dry run: loading into memory");
        Arc::new(MemoryTableWriter::new())
    } else {
        Arc::new(PgTableWriter::connect(&config.database).await?)
    };

    let mut orchestrator = Orchestrator::from_config(config, writer)?;
    if dry_run {
        orchestrator = orchestrator.dry_run();
    }

    let Some(minutes) = every else {
        let summaries = orchestrator.run_all(config, &sources).await?;
        return print_summaries(&summaries, json);
    };

    let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    info!(minutes, "Running on a fixed interval, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                return Ok(());
            },
        }

        match orchestrator.run_all(config, &sources).await {
            Ok(summaries) => print_summaries(&summaries, json)?,
            Err(e @ IngestError::LedgerCorrupt { .. }) => return Err(e),
            Err(e) => error!(error = %e, "Run failed, retrying on next tick"),
        }
    }
}

/// Configured sources filtered to `names`; all of them when `names` is empty
pub fn select_sources(config: &IngestConfig, names: &[String]) -> Result<Vec<SourceConfig>> {
    if names.is_empty() {
        return Ok(config.sources.clone());
    }

    names
        .iter()
        .map(|name| {
            config.source(name).cloned().ok_or_else(|| {
                let known: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
                IngestError::config(format!(
                    "unknown source '{}' (configured: {})",
                    name,
                    known.join(", ")
                ))
            })
        })
        .collect()
}

fn print_summaries(summaries: &[RunSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    print!("{}", format_summaries(summaries));
    for summary in summaries {
        let problems: Vec<_> = summary.files.iter().filter(|f| f.outcome.is_error()).collect();
        if problems.is_empty() {
            continue;
        }
        let mut table = new_table(vec!["File", "Outcome", "Detail"]);
        for report in problems {
            let detail = match &report.outcome {
                IngestionOutcome::ReadError(d) | IngestionOutcome::LoadError(d) => d.as_str(),
                _ => "",
            };
            table.add_row(vec![report.file_id.as_str(), report.outcome.label(), detail]);
        }
        println!("{} ({})\n{}", summary.table, summary.folder.display(), table);
    }
    Ok(())
}

/// One row per source run
pub fn format_summaries(summaries: &[RunSummary]) -> String {
    let mut table = new_table(vec![
        "Table", "Category", "Scanned", "Loaded", "Rows", "Duplicates", "Empty", "Errors",
    ]);
    for s in summaries {
        table.add_row(vec![
            s.table.clone(),
            s.category.to_string(),
            s.files_scanned.to_string(),
            s.files_loaded().to_string(),
            s.rows_loaded.to_string(),
            s.duplicates.to_string(),
            s.empties.to_string(),
            s.errors.to_string(),
        ]);
    }
    format!("{}\n", table)
}

fn show_ledger(config: &IngestConfig, category: Option<Category>) -> Result<()> {
    let store = CsvLedgerStore::new(config.ledger_path());
    let entries: Vec<_> = store
        .read_all()?
        .into_iter()
        .filter(|e| category.map_or(true, |c| e.category == c))
        .collect();

    if entries.is_empty() {
        println!("No ledger entries in {}", store.describe());
        return Ok(());
    }

    let mut table = new_table(vec!["Category", "File", "Fingerprint", "Loaded at"]);
    for entry in &entries {
        table.add_row(vec![
            entry.category.to_string(),
            entry.file_id.clone(),
            entry.fingerprint.clone(),
            entry.loaded_at.to_rfc3339(),
        ]);
    }
    println!("{}", table);
    println!("{} entries", entries.len());
    Ok(())
}

fn show_sources(config: &IngestConfig) {
    let mut table = new_table(vec!["Name", "Folder", "Table", "Category", "Extensions"]);
    for source in &config.sources {
        table.add_row(vec![
            source.name.clone(),
            config.source_folder(source).display().to_string(),
            source.table.clone(),
            source.category.to_string(),
            config.extensions_for(source).join(", "),
        ]);
    }
    println!("{}", table);
}

fn new_table<T: Into<comfy_table::Cell>>(header: Vec<T>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}
