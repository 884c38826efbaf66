//! CSV file backing for the ledger

use chrono::SecondsFormat;
use dropzone_common::types::parse_timestamp;
use dropzone_common::LedgerEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

use super::LedgerStore;
use crate::error::{IngestError, Result};

/// Column names of the persisted ledger, in order
pub const LEDGER_HEADER: [&str; 4] = ["FolderType", "FileName", "FileHash", "Load_Timestamp"];

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(rename = "FolderType")]
    folder_type: String,
    #[serde(rename = "FileName")]
    file_name: String,
    #[serde(rename = "FileHash")]
    file_hash: String,
    #[serde(rename = "Load_Timestamp")]
    load_timestamp: String,
}

impl From<&LedgerEntry> for LedgerRow {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            folder_type: entry.category.to_string(),
            file_name: entry.file_id.clone(),
            file_hash: entry.fingerprint.clone(),
            load_timestamp: entry.loaded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

impl LedgerRow {
    fn into_entry(self) -> std::result::Result<LedgerEntry, String> {
        let category = self.folder_type.parse().map_err(|e| format!("{e}"))?;
        let loaded_at = parse_timestamp(&self.load_timestamp).map_err(|e| format!("{e}"))?;
        Ok(LedgerEntry::new(category, self.file_name, self.file_hash, loaded_at))
    }
}

/// Commit locks shared by every store in the process, keyed by ledger file
static COMMIT_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Ledger persisted as a headed CSV file, rewritten atomically on commit.
///
/// Stores opened on the same file share one commit lock.
#[derive(Debug)]
pub struct CsvLedgerStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = commit_lock(&path);
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl std::fmt::Display) -> IngestError {
        IngestError::ledger_corrupt(self.path.display().to_string(), reason)
    }
}

/// `path` made absolute with its directory resolved, so different spellings of
/// one ledger file map to the same key. The file itself may not exist yet.
fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let resolved = dir.canonicalize().or_else(|_| std::path::absolute(dir));
    match (resolved, path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn commit_lock(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = COMMIT_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(lock_key(path)).or_default().clone()
}

impl LedgerStore for CsvLedgerStore {
    fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger yet, starting empty");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::Reader::from_reader(file);
        let headers = reader.headers().map_err(|e| self.corrupt(e))?.clone();
        if !headers.is_empty() {
            for expected in LEDGER_HEADER {
                if !headers.iter().any(|h| h == expected) {
                    return Err(self.corrupt(format!("missing column '{expected}'")));
                }
            }
        }

        let mut entries = Vec::new();
        for (index, row) in reader.deserialize::<LedgerRow>().enumerate() {
            let row = row.map_err(|e| self.corrupt(format!("row {}: {e}", index + 1)))?;
            let entry = row
                .into_entry()
                .map_err(|e| self.corrupt(format!("row {}: {e}", index + 1)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn replace_all(&self, entries: &[LedgerEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            if entries.is_empty() {
                writer.write_record(LEDGER_HEADER).map_err(std::io::Error::from)?;
            }
            for entry in entries {
                writer.serialize(LedgerRow::from(entry)).map_err(std::io::Error::from)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), entries = entries.len(), "Ledger written");
        Ok(())
    }

    fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
