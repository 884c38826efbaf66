//! Common types used across Dropzone

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical source type of an ingested file.
///
/// The category decides which normalization rules apply and partitions the
/// ledger: the same file name may be loaded once per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Line-level product sales exports
    #[serde(alias = "Product", alias = "PRODUCT")]
    Product,
    /// Aggregated summary exports
    #[serde(alias = "Summary", alias = "SUMMARY")]
    Summary,
}

impl Category {
    /// Value stored in the ledger's `FolderType` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Product => "Product",
            Category::Summary => "Summary",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "product" => Ok(Category::Product),
            "summary" => Ok(Category::Summary),
            _ => Err(Error::InvalidCategory(s.to_string())),
        }
    }
}

/// Digest algorithm used to fingerprint file contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    #[default]
    Sha256,
    /// Compatible with ledgers written by the legacy pipeline
    Md5,
}

impl std::fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FingerprintAlgorithm::Sha256 => write!(f, "sha256"),
            FingerprintAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

impl std::str::FromStr for FingerprintAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(FingerprintAlgorithm::Sha256),
            "md5" => Ok(FingerprintAlgorithm::Md5),
            _ => Err(Error::InvalidAlgorithm(s.to_string())),
        }
    }
}

/// A committed (category, file, content version) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub category: Category,
    /// File name inside the watched folder
    pub file_id: String,
    /// Content digest of the file at load time
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

/// Identity of a ledger entry; timestamps are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub category: Category,
    pub file_id: String,
    pub fingerprint: String,
}

impl LedgerEntry {
    pub fn new(
        category: Category,
        file_id: impl Into<String>,
        fingerprint: impl Into<String>,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            category,
            file_id: file_id.into(),
            fingerprint: fingerprint.into(),
            loaded_at,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            category: self.category,
            file_id: self.file_id.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn matches(&self, category: Category, file_id: &str, fingerprint: &str) -> bool {
        self.category == category && self.file_id == file_id && self.fingerprint == fingerprint
    }
}

/// Parse a ledger timestamp.
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS[.ffffff]` form, which
/// is read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::InvalidTimestamp(value.to_string()))
}
