//! Error types for ingestion
//!
//! File-level errors (`Read`, `Load`) are caught by the orchestrator at the
//! per-file boundary and never abort a run. Ledger errors are run-level.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Boxed cause reported by a destination writer
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// File unreadable or not parseable as delimited tabular data
    #[error("Failed to read '{file}': {reason}")]
    Read { file: String, reason: String },

    /// Destination write failed; chunks written before the failure stay committed
    #[error("Failed to load into table '{table}' after {rows_written} rows: {source}")]
    Load {
        table: String,
        rows_written: usize,
        #[source]
        source: BoxError,
    },

    /// Persisted ledger exists but cannot be parsed
    #[error("Ledger '{path}' is corrupt: {reason}. Repair or remove it before running again.")]
    LedgerCorrupt { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] dropzone_common::Error),
}

impl IngestError {
    pub fn read(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Read {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn load(table: impl Into<String>, rows_written: usize, source: impl Into<BoxError>) -> Self {
        Self::Load {
            table: table.into(),
            rows_written,
            source: source.into(),
        }
    }

    pub fn ledger_corrupt(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::LedgerCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is scoped to a single file
    pub fn is_file_level(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Load { .. })
    }
}
