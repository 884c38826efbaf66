//! Build automation tasks for Dropzone
//!
//! Currently regenerates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Dropzone", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<dropzone_ingest::Cli>();

    let content = format!(
        r#"# Dropzone CLI Reference

Generated from the CLI source code on {}.

## Overview

`dropzone` loads CSV exports dropped into watched folders into PostgreSQL
tables. Each file version is loaded at most once: a ledger records the
category, file name and content fingerprint of every successful load, so
re-running is always safe.

## Quick Start

```bash
# Show which folders feed which tables
dropzone sources

# Try a run without touching the database or ledger
dropzone run --dry-run

# Load new and changed files
dropzone run

# Keep loading every two hours until ctrl-c
dropzone run --every 120

# Inspect what has been loaded
dropzone ledger --category product
```

## Commands

{}

## Environment Variables

- `DROPZONE_CONFIG` - Configuration file (default: `./dropzone.toml` when present)
- `DROPZONE_BASE_DIR` - Root for source folders, ledger and run log
- `DROPZONE_LEDGER_PATH` - Ledger file (default: `loaded_files_hash.csv`)
- `DROPZONE_RUN_LOG_PATH` - Run log file (default: `pipeline_log.txt`)
- `DROPZONE_CHUNK_SIZE` - Rows per insert statement (default: `500`)
- `DROPZONE_FINGERPRINT` - `sha256` (default) or `md5`
- `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`, `DATABASE_SCHEMA`
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging

## Configuration

Example `dropzone.toml`:

```toml
base_dir = "/srv/dropzone"
chunk_size = 500

[database]
url = "postgresql://localhost/business_retail"

[[source]]
name = "product"
folder = "product_sales"
table = "ProductSales"
category = "product"

[[source]]
name = "summary"
folder = "summary_sales"
table = "SummarySales"
category = "summary"
```

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
