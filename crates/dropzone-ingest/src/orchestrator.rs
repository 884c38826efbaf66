//! Folder ingestion runs
//!
//! A run walks one folder in file-name order and drives each matching file
//! through fingerprint, ledger check, parse, normalize and load. Failures are
//! contained per file and reported in the [`RunSummary`]; only ledger and
//! folder-listing problems abort the run. The ledger is committed once at the
//! end of the run.

use chrono::{DateTime, Utc};
use dropzone_common::fingerprint::fingerprint;
use dropzone_common::{Category, FingerprintAlgorithm};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{normalize_extensions, IngestConfig, SourceConfig, DEFAULT_EXTENSION};
use crate::error::{IngestError, Result};
use crate::ledger::{CsvLedgerStore, Ledger, LedgerStore};
use crate::loader::{BatchLoader, TableWriter};
use crate::normalize::{normalize, Provenance};
use crate::run_log::RunLog;
use crate::table::TabularBatch;

/// Rows shown in the debug preview of each normalized batch
const PREVIEW_ROWS: usize = 2;

/// Terminal state of one file within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum IngestionOutcome {
    /// Same content already recorded for this file and category
    SkippedDuplicate,
    /// Parsed to zero records; retried on every run
    SkippedEmpty,
    ReadError(String),
    LoadError(String),
    /// Rows appended
    Loaded(usize),
}

impl IngestionOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ReadError(_) | Self::LoadError(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SkippedDuplicate => "duplicate",
            Self::SkippedEmpty => "empty",
            Self::ReadError(_) => "read error",
            Self::LoadError(_) => "load error",
            Self::Loaded(_) => "loaded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file_id: String,
    pub outcome: IngestionOutcome,
}

/// Aggregate result of one folder run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub folder: PathBuf,
    pub table: String,
    pub category: Category,
    pub files_scanned: usize,
    pub rows_loaded: usize,
    pub errors: usize,
    pub duplicates: usize,
    pub empties: usize,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(folder: impl Into<PathBuf>, table: impl Into<String>, category: Category) -> Self {
        Self {
            folder: folder.into(),
            table: table.into(),
            category,
            files_scanned: 0,
            rows_loaded: 0,
            errors: 0,
            duplicates: 0,
            empties: 0,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, file_id: impl Into<String>, outcome: IngestionOutcome) {
        self.files_scanned += 1;
        match &outcome {
            IngestionOutcome::SkippedDuplicate => self.duplicates += 1,
            IngestionOutcome::SkippedEmpty => self.empties += 1,
            IngestionOutcome::ReadError(_) | IngestionOutcome::LoadError(_) => self.errors += 1,
            IngestionOutcome::Loaded(rows) => self.rows_loaded += rows,
        }
        self.files.push(FileReport {
            file_id: file_id.into(),
            outcome,
        });
    }

    pub fn files_loaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, IngestionOutcome::Loaded(_)))
            .count()
    }

    pub fn outcome(&self, file_id: &str) -> Option<&IngestionOutcome> {
        self.files.iter().find(|f| f.file_id == file_id).map(|f| &f.outcome)
    }
}

/// Runs folders through the pipeline against one ledger and destination
pub struct Orchestrator {
    ledger_store: Arc<dyn LedgerStore>,
    loader: BatchLoader,
    fingerprint: FingerprintAlgorithm,
    extensions: Vec<String>,
    run_log: Option<RunLog>,
    commit_ledger: bool,
}

impl Orchestrator {
    pub fn new(ledger_store: Arc<dyn LedgerStore>, loader: BatchLoader) -> Self {
        Self {
            ledger_store,
            loader,
            fingerprint: FingerprintAlgorithm::default(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            run_log: None,
            commit_ledger: true,
        }
    }

    /// Wire ledger, run log and loader from configuration
    pub fn from_config(config: &IngestConfig, writer: Arc<dyn TableWriter>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(CsvLedgerStore::new(config.ledger_path()));
        let loader = BatchLoader::new(writer, config.chunk_size)?;

        Ok(Self::new(store, loader)
            .with_fingerprint(config.fingerprint)
            .with_extensions(config.extensions.clone())
            .with_run_log(RunLog::new(config.run_log_path())))
    }

    pub fn with_fingerprint(mut self, algorithm: FingerprintAlgorithm) -> Self {
        self.fingerprint = algorithm;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = normalize_extensions(&extensions);
        self
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Load without committing the ledger or writing the run log
    pub fn dry_run(mut self) -> Self {
        self.commit_ledger = false;
        self.run_log = None;
        self
    }

    /// Ingest every matching file in `folder` into `table`
    pub async fn run(&self, folder: &Path, table: &str, category: Category) -> Result<RunSummary> {
        self.run_with_extensions(folder, table, category, &self.extensions).await
    }

    /// Run one configured source
    pub async fn run_source(&self, config: &IngestConfig, source: &SourceConfig) -> Result<RunSummary> {
        let folder = config.source_folder(source);
        let extensions = config.extensions_for(source);
        self.run_with_extensions(&folder, &source.table, source.category, &extensions)
            .instrument(info_span!("source", name = %source.name))
            .await
    }

    /// Run sources in order, stopping at the first run-level error
    pub async fn run_all(&self, config: &IngestConfig, sources: &[SourceConfig]) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::with_capacity(sources.len());
        for source in sources {
            summaries.push(self.run_source(config, source).await?);
        }
        Ok(summaries)
    }

    async fn run_with_extensions(
        &self,
        folder: &Path,
        table: &str,
        category: Category,
        extensions: &[String],
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new(folder, table, category);
        let mut ledger = Ledger::load(self.ledger_store.clone())?;

        if !tokio::fs::try_exists(folder).await? {
            tokio::fs::create_dir_all(folder).await?;
            warn!(folder = %folder.display(), "Source folder did not exist, created it");
            return Ok(summary);
        }

        let files = list_files(folder, extensions).await?;
        info!(
            folder = %folder.display(),
            table,
            category = %category,
            files = files.len(),
            "Starting run"
        );

        for (file_id, path) in files {
            let outcome = self
                .ingest_file(&mut ledger, &path, &file_id, table, category)
                .instrument(info_span!("file", file = %file_id))
                .await;
            summary.record(file_id, outcome);
        }

        if self.commit_ledger {
            ledger.commit()?;
        } else {
            debug!(staged = ledger.staged(), "Dry run, ledger not committed");
        }

        info!(
            table,
            files_scanned = summary.files_scanned,
            rows_loaded = summary.rows_loaded,
            duplicates = summary.duplicates,
            empties = summary.empties,
            errors = summary.errors,
            "Run complete"
        );
        Ok(summary)
    }

    async fn ingest_file(
        &self,
        ledger: &mut Ledger,
        path: &Path,
        file_id: &str,
        table: &str,
        category: Category,
    ) -> IngestionOutcome {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return read_error(file_id, e),
        };

        let digest = fingerprint(&bytes, self.fingerprint);
        if ledger.is_loaded(category, file_id, &digest) {
            info!(fingerprint = %digest, "Already loaded, skipping");
            return IngestionOutcome::SkippedDuplicate;
        }

        let batch = match TabularBatch::from_csv(&bytes) {
            Ok(batch) => batch,
            Err(e) => return read_error(file_id, e),
        };
        if batch.is_empty() {
            info!("No records, skipping");
            return IngestionOutcome::SkippedEmpty;
        }

        let modified_at: DateTime<Utc> = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(time) => time.into(),
            Err(e) => return read_error(file_id, e),
        };
        let provenance = Provenance {
            file_id: file_id.to_string(),
            loaded_at: Utc::now(),
            modified_at,
        };

        let batch = normalize(batch, category, &provenance);
        debug!(
            rows = batch.row_count(),
            columns = batch.column_count(),
            preview = %batch.preview(PREVIEW_ROWS),
            "Normalized batch"
        );

        match self.loader.append(table, &batch).await {
            Ok(rows) => {
                let now = Utc::now();
                ledger.record(category, file_id, digest, now);
                if let Some(run_log) = &self.run_log {
                    if let Err(e) = run_log.append(now, file_id, table, rows) {
                        warn!(path = %run_log.path().display(), error = %e, "Failed to append run log");
                    }
                }
                info!(rows, table, "Loaded file");
                IngestionOutcome::Loaded(rows)
            },
            Err(e) => {
                error!(error = %e, "Load failed, file will be retried next run");
                IngestionOutcome::LoadError(e.to_string())
            },
        }
    }
}

fn read_error(file_id: &str, reason: impl std::fmt::Display) -> IngestionOutcome {
    let err = IngestError::read(file_id, reason);
    warn!(error = %err, "Read failed");
    IngestionOutcome::ReadError(err.to_string())
}

/// Regular files with a matching extension, sorted by file name
async fn list_files(folder: &Path, extensions: &[String]) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut dir = tokio::fs::read_dir(folder).await?;

    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if !matches {
            continue;
        }
        // follows symlinks
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {},
            _ => continue,
        }
        files.push((entry.file_name().to_string_lossy().into_owned(), path));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new("in", "T", Category::Product);
        summary.record("a.csv", IngestionOutcome::Loaded(3));
        summary.record("b.csv", IngestionOutcome::Loaded(2));
        summary.record("c.csv", IngestionOutcome::SkippedDuplicate);
        summary.record("d.csv", IngestionOutcome::SkippedEmpty);
        summary.record("e.csv", IngestionOutcome::ReadError("bad".into()));
        summary.record("f.csv", IngestionOutcome::LoadError("down".into()));

        assert_eq!(summary.files_scanned, 6);
        assert_eq!(summary.rows_loaded, 5);
        assert_eq!(summary.files_loaded(), 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.empties, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.outcome("c.csv"), Some(&IngestionOutcome::SkippedDuplicate));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(IngestionOutcome::Loaded(4)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "loaded", "detail": 4}));
        let json = serde_json::to_value(IngestionOutcome::SkippedEmpty).unwrap();
        assert_eq!(json, serde_json::json!({"status": "skipped_empty"}));
    }

    #[test]
    fn test_normalize_extensions() {
        let exts = normalize_extensions(&[".CSV".into(), " txt ".into(), "".into()]);
        assert_eq!(exts, vec!["csv", "txt"]);
    }

    #[tokio::test]
    async fn test_list_files_filters_and_sorts() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("a.CSV"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let files = list_files(dir.path(), &["csv".to_string()]).await.unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
