//! Configuration management
//!
//! Settings come from an optional TOML file, then environment variables
//! (a `.env` file is honored), then validation.

use dropzone_common::{Category, FingerprintAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "dropzone.toml";

/// Root under which relative source folders, ledger and run log resolve.
pub const DEFAULT_BASE_DIR: &str = ".";

pub const DEFAULT_LEDGER_FILE: &str = "loaded_files_hash.csv";

pub const DEFAULT_RUN_LOG_FILE: &str = "pipeline_log.txt";

/// Rows per insert statement.
pub const DEFAULT_CHUNK_SIZE: usize = crate::loader::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_EXTENSION: &str = "csv";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/business_retail";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub base_dir: PathBuf,
    /// Ledger file; relative paths resolve against `base_dir`
    pub ledger_path: PathBuf,
    /// Human-readable run log; relative paths resolve against `base_dir`
    pub run_log_path: PathBuf,
    pub chunk_size: usize,
    pub fingerprint: FingerprintAlgorithm,
    /// File extensions picked up when a source does not set its own
    pub extensions: Vec<String>,
    pub database: DatabaseConfig,
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// One watched folder and where its files go
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub folder: PathBuf,
    pub table: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub statement_timeout_secs: Option<u64>,
    /// Schema for destination tables; the connection's search path when unset
    pub schema: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            statement_timeout_secs: None,
            schema: None,
        }
    }
}

impl SourceConfig {
    pub fn new(
        name: impl Into<String>,
        folder: impl Into<PathBuf>,
        table: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            table: table.into(),
            category,
            extensions: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_FILE),
            run_log_path: PathBuf::from(DEFAULT_RUN_LOG_FILE),
            chunk_size: DEFAULT_CHUNK_SIZE,
            fingerprint: FingerprintAlgorithm::default(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            database: DatabaseConfig::default(),
            sources: vec![
                SourceConfig::new("product", "product_sales", "ProductSales", Category::Product),
                SourceConfig::new("summary", "summary_sales", "SummarySales", Category::Summary),
            ],
        }
    }
}

impl IngestConfig {
    /// Load configuration from file, environment and defaults.
    ///
    /// With no explicit path, `dropzone.toml` in the working directory is
    /// used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Self::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| IngestError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| IngestError::config(e.to_string()))
    }

    /// Overlay `DROPZONE_*` and `DATABASE_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("DROPZONE_BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("DROPZONE_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DROPZONE_RUN_LOG_PATH") {
            self.run_log_path = PathBuf::from(path);
        }
        if let Some(size) = parse_env("DROPZONE_CHUNK_SIZE")? {
            self.chunk_size = size;
        }
        if let Ok(algorithm) = std::env::var("DROPZONE_FINGERPRINT") {
            self.fingerprint = algorithm.parse()?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = parse_env("DATABASE_MAX_CONNECTIONS")? {
            self.database.max_connections = max;
        }
        if let Some(secs) = parse_env("DATABASE_CONNECT_TIMEOUT")? {
            self.database.connect_timeout_secs = secs;
        }
        if let Ok(schema) = std::env::var("DATABASE_SCHEMA") {
            self.database.schema = Some(schema).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IngestError::config("chunk_size must be greater than 0"));
        }

        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(IngestError::config("at least one file extension is required"));
        }

        if self.database.url.is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config("Database max_connections must be greater than 0"));
        }

        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(IngestError::config("source name cannot be empty"));
            }
            if !names.insert(source.name.as_str()) {
                return Err(IngestError::config(format!("duplicate source name '{}'", source.name)));
            }
            if source.table.trim().is_empty() {
                return Err(IngestError::config(format!(
                    "source '{}' has an empty table name",
                    source.name
                )));
            }
        }

        if self.sources.is_empty() {
            tracing::warn!("No sources configured - runs will do nothing");
        }

        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger_path)
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.resolve(&self.run_log_path)
    }

    pub fn source_folder(&self, source: &SourceConfig) -> PathBuf {
        self.resolve(&source.folder)
    }

    /// Lowercased extensions without leading dots
    pub fn extensions_for(&self, source: &SourceConfig) -> Vec<String> {
        normalize_extensions(source.extensions.as_ref().unwrap_or(&self.extensions))
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| IngestError::config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Lowercase, without leading dots, blanks dropped
pub(crate) fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
