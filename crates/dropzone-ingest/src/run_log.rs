//! Append-only, human-readable log of successful loads
//!
//! One line per loaded file:
//! `2024-02-01T09:00:00+00:00: Loaded 'jan.csv' into 'ProductSales' (120 rows)`

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_line(at: DateTime<Utc>, file_id: &str, table: &str, rows: usize) -> String {
        format!(
            "{}: Loaded '{}' into '{}' ({} rows)",
            at.to_rfc3339_opts(SecondsFormat::Secs, false),
            file_id,
            table,
            rows
        )
    }

    pub fn append(&self, at: DateTime<Utc>, file_id: &str, table: &str, rows: usize) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", Self::format_line(at, file_id, table, rows))
    }
}
