//! Dropzone - folder-to-database ingestion tool

use clap::Parser;
use dropzone_common::logging::{init_logging, LogConfig, LogLevel};
use dropzone_ingest::config::IngestConfig;
use dropzone_ingest::{cli, Cli};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return Ok(());
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dropzone")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load(cli.config.as_deref())?;
    info!(
        base_dir = %config.base_dir.display(),
        sources = config.sources.len(),
        "Configuration loaded"
    );

    if let Err(e) = cli::execute(&config, command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    Ok(())
}
