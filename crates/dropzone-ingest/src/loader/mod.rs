//! Appending normalized batches to destination tables
//!
//! A [`TableWriter`] knows how to create a table and insert a range of rows.
//! [`BatchLoader`] drives it chunk by chunk. Each chunk commits on its own, so
//! a failure part way through leaves earlier chunks in the destination.

mod memory;
mod postgres;

pub use memory::{MemoryTable, MemoryTableWriter, MemoryWriteError};
pub use postgres::{PgTableWriter, PG_MAX_BIND_PARAMS};

use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BoxError, IngestError, Result};
use crate::table::TabularBatch;

/// Rows per insert statement unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Destination capable of appending rows to named tables
#[async_trait]
pub trait TableWriter: Send + Sync {
    /// Create `table` with the batch's columns if it does not exist
    async fn ensure_table(&self, table: &str, batch: &TabularBatch) -> std::result::Result<(), BoxError>;

    /// Insert `rows` of `batch` as one committed unit
    async fn insert_rows(
        &self,
        table: &str,
        batch: &TabularBatch,
        rows: Range<usize>,
    ) -> std::result::Result<(), BoxError>;

    /// Upper bound on rows per insert for a batch this wide
    fn max_rows_per_insert(&self, _column_count: usize) -> usize {
        usize::MAX
    }

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Splits batches into chunks and appends them through a [`TableWriter`]
#[derive(Clone)]
pub struct BatchLoader {
    writer: Arc<dyn TableWriter>,
    chunk_size: usize,
}

impl BatchLoader {
    pub fn new(writer: Arc<dyn TableWriter>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IngestError::config("chunk size must be greater than zero"));
        }
        Ok(Self { writer, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Effective chunk size for a batch, after the writer's limits
    pub fn rows_per_chunk(&self, batch: &TabularBatch) -> usize {
        self.chunk_size
            .min(self.writer.max_rows_per_insert(batch.column_count()))
            .max(1)
    }

    /// Append every row of `batch` to `table`, creating the table if needed.
    ///
    /// Returns the number of rows written. On failure the error reports how
    /// many rows made it in before the failing chunk.
    pub async fn append(&self, table: &str, batch: &TabularBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        self.writer
            .ensure_table(table, batch)
            .await
            .map_err(|e| IngestError::load(table, 0, e))?;

        let total = batch.row_count();
        let chunk = self.rows_per_chunk(batch);
        let mut written = 0;

        while written < total {
            let end = (written + chunk).min(total);
            if let Err(e) = self.writer.insert_rows(table, batch, written..end).await {
                warn!(
                    table,
                    writer = self.writer.name(),
                    rows_written = written,
                    rows_remaining = total - written,
                    error = %e,
                    "Chunk insert failed, aborting remaining chunks"
                );
                return Err(IngestError::load(table, written, e));
            }
            debug!(table, rows = end - written, "Chunk committed");
            written = end;
        }

        Ok(written)
    }
}
