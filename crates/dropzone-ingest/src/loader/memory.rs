//! In-process destination used for dry runs and tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::TableWriter;
use crate::error::BoxError;
use crate::table::{ColumnType, TabularBatch, Value};

#[derive(Debug, Error)]
pub enum MemoryWriteError {
    #[error("table \"{0}\" does not exist")]
    UnknownTable(String),

    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("column \"{0}\" specified more than once")]
    DuplicateColumn(String),

    #[error("injected failure after {0} chunks")]
    Injected(usize),
}

/// Rows appended to one table, columns in creation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(c, _)| c == name)
    }

    /// All values of one column, in insertion order
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        match self.column_index(name) {
            Some(i) => self.rows.iter().map(|row| row[i].clone()).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    chunks_written: usize,
    fail_after: Option<usize>,
}

/// Table writer holding everything in memory.
///
/// Mirrors append semantics of a SQL destination: tables are created on first
/// use and later inserts may only name columns the table already has.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableWriter {
    state: Arc<Mutex<State>>,
    bind_limit: Option<usize>,
}

impl MemoryTableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap rows per insert the way a bind-parameter limit would
    pub fn with_bind_limit(limit: usize) -> Self {
        Self {
            bind_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Fail every insert once `chunks` more chunks have succeeded
    pub fn fail_after_chunks(&self, chunks: usize) {
        let mut state = self.lock();
        state.fail_after = Some(state.chunks_written + chunks);
    }

    pub fn clear_failure(&self) {
        self.lock().fail_after = None;
    }

    pub fn chunks_written(&self) -> usize {
        self.lock().chunks_written
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn table(&self, table: &str) -> Option<MemoryTable> {
        self.lock().tables.get(table).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TableWriter for MemoryTableWriter {
    async fn ensure_table(&self, table: &str, batch: &TabularBatch) -> Result<(), BoxError> {
        reject_duplicate_columns(batch)?;
        self.lock()
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemoryTable {
                columns: batch.columns().iter().map(|c| (c.name.clone(), c.kind)).collect(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &str,
        batch: &TabularBatch,
        rows: Range<usize>,
    ) -> Result<(), BoxError> {
        reject_duplicate_columns(batch)?;
        let mut state = self.lock();
        if let Some(limit) = state.fail_after {
            if state.chunks_written >= limit {
                return Err(MemoryWriteError::Injected(state.chunks_written).into());
            }
        }

        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MemoryWriteError::UnknownTable(table.to_string()))?;

        let mut positions = Vec::with_capacity(batch.column_count());
        for column in batch.columns() {
            let index = target
                .column_index(&column.name)
                .ok_or_else(|| MemoryWriteError::UnknownColumn {
                    table: table.to_string(),
                    column: column.name.clone(),
                })?;
            positions.push(index);
        }

        for row in rows {
            let mut values = vec![Value::Null; target.columns.len()];
            for (column, &index) in batch.columns().iter().zip(&positions) {
                values[index] = column.values[row].clone();
            }
            target.rows.push(values);
        }
        state.chunks_written += 1;
        Ok(())
    }

    fn max_rows_per_insert(&self, column_count: usize) -> usize {
        match self.bind_limit {
            Some(limit) => limit / column_count.max(1),
            None => usize::MAX,
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn reject_duplicate_columns(batch: &TabularBatch) -> Result<(), MemoryWriteError> {
    let mut seen = HashSet::new();
    match batch.column_names().find(|name| !seen.insert(*name)) {
        Some(name) => Err(MemoryWriteError::DuplicateColumn(name.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[tokio::test]
    async fn test_table_created_from_first_batch() {
        let writer = MemoryTableWriter::new();
        let batch = TabularBatch::from_csv(b"region,units\nnorth,3\n").unwrap();

        writer.ensure_table("Sales", &batch).await.unwrap();
        writer.insert_rows("Sales", &batch, 0..1).await.unwrap();

        let table = writer.table("Sales").unwrap();
        assert_eq!(
            table.columns,
            vec![
                ("region".to_string(), ColumnType::Text),
                ("units".to_string(), ColumnType::Integer)
            ]
        );
        assert_eq!(table.column_values("units"), vec![Value::Integer(3)]);
    }

    #[tokio::test]
    async fn test_subset_of_columns_fills_null() {
        let writer = MemoryTableWriter::new();
        let wide = TabularBatch::from_csv(b"a,b\n1,2\n").unwrap();
        let narrow = TabularBatch::from_csv(b"b\n5\n").unwrap();

        writer.ensure_table("T", &wide).await.unwrap();
        writer.insert_rows("T", &narrow, 0..1).await.unwrap();

        assert_eq!(writer.table("T").unwrap().rows[0], vec![Value::Null, Value::Integer(5)]);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let writer = MemoryTableWriter::new();
        let first = TabularBatch::from_csv(b"a\n1\n").unwrap();
        let second = TabularBatch::from_csv(b"a,extra\n1,2\n").unwrap();

        writer.ensure_table("T", &first).await.unwrap();
        writer.ensure_table("T", &second).await.unwrap();
        let err = writer.insert_rows("T", &second, 0..1).await.unwrap_err();

        assert!(err.to_string().contains("\"extra\""));
        assert_eq!(writer.row_count("T"), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_can_be_cleared() {
        let writer = MemoryTableWriter::new();
        let batch = TabularBatch::from_csv(b"a\n1\n").unwrap();
        writer.ensure_table("T", &batch).await.unwrap();

        writer.fail_after_chunks(0);
        assert!(writer.insert_rows("T", &batch, 0..1).await.is_err());

        writer.clear_failure();
        writer.insert_rows("T", &batch, 0..1).await.unwrap();
        assert_eq!(writer.row_count("T"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_column_names_are_rejected() {
        let writer = MemoryTableWriter::new();
        let batch = TabularBatch::from_columns(vec![
            Column::new("a_b", ColumnType::Integer, vec![Value::Integer(1)]),
            Column::new("a_b", ColumnType::Integer, vec![Value::Integer(2)]),
        ])
        .unwrap();

        let err = writer.ensure_table("T", &batch).await.unwrap_err();
        assert_eq!(err.to_string(), "column \"a_b\" specified more than once");
        assert!(writer.table("T").is_none());
        assert!(writer.insert_rows("T", &batch, 0..1).await.is_err());
    }
}
