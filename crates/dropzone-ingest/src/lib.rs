//! Dropzone Ingest Library
//!
//! Idempotent ingestion of CSV exports dropped into watched folders.
//!
//! # Pipeline
//!
//! - **Fingerprint**: each file's bytes are digested; unchanged files are skipped
//! - **Ledger**: a CSV record of `(category, file, fingerprint)` triples already loaded
//! - **Normalize**: column cleanup, category fills and provenance columns
//! - **Load**: chunked appends to PostgreSQL (or memory for dry runs)
//!
//! # Example
//!
//! ```no_run
//! use dropzone_ingest::config::IngestConfig;
//! use dropzone_ingest::loader::PgTableWriter;
//! use dropzone_ingest::orchestrator::Orchestrator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load(None)?;
//!     let writer = Arc::new(PgTableWriter::connect(&config.database).await?);
//!     let orchestrator = Orchestrator::from_config(&config, writer)?;
//!     for summary in orchestrator.run_all(&config, &config.sources).await? {
//!         println!("{}: {} rows", summary.table, summary.rows_loaded);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod normalize;
pub mod orchestrator;
pub mod run_log;
pub mod table;

pub use cli::{Cli, Commands};
pub use error::{IngestError, Result};
pub use orchestrator::{IngestionOutcome, Orchestrator, RunSummary};
