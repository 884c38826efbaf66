//! Shared helpers for ingestion integration tests

#![allow(dead_code)]

use dropzone_ingest::config::{IngestConfig, SourceConfig};
use dropzone_ingest::loader::MemoryTableWriter;
use dropzone_ingest::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dropzone_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A throwaway base directory laid out like a deployment
pub struct Workspace {
    pub dir: TempDir,
    pub config: IngestConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = IngestConfig {
            base_dir: dir.path().to_path_buf(),
            ..IngestConfig::default()
        };
        for source in &config.sources {
            std::fs::create_dir_all(config.source_folder(source)).expect("Failed to create folder");
        }
        Self { dir, config }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn source(&self, name: &str) -> SourceConfig {
        self.config.source(name).cloned().expect("Unknown source")
    }

    pub fn product(&self) -> SourceConfig {
        self.source("product")
    }

    pub fn summary(&self) -> SourceConfig {
        self.source("summary")
    }

    pub fn folder(&self, source: &SourceConfig) -> PathBuf {
        self.config.source_folder(source)
    }

    /// Write (or overwrite) a file in the source's folder
    pub fn drop_file(&self, source: &SourceConfig, name: &str, contents: &str) -> PathBuf {
        let path = self.folder(source).join(name);
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config.ledger_path()
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.config.run_log_path()
    }

    pub fn ledger_lines(&self) -> Vec<String> {
        read_lines(&self.ledger_path())
    }

    pub fn run_log_lines(&self) -> Vec<String> {
        read_lines(&self.run_log_path())
    }

    pub fn orchestrator(&self, writer: &MemoryTableWriter) -> Orchestrator {
        Orchestrator::from_config(&self.config, Arc::new(writer.clone()))
            .expect("Failed to build orchestrator")
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub const JAN: &str = "Region,Product Type,Units,Unit Price\n\
north,Widget,10,2.5\n\
south,,4,3.0\n\
east,Gadget,,1.25\n";

pub const FEB: &str = "Region,Product Type,Units,Unit Price\n\
north,Widget,12,2.5\n\
west,Gizmo,7,4.0\n";
