//! Dropzone Common Library
//!
//! Shared types, utilities, and error handling for the Dropzone workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Custom error types and result types
//! - **Fingerprints**: Content digests used as change-detection keys
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: Categories and ledger entries
//!
//! # Example
//!
//! ```no_run
//! use dropzone_common::Result;
//! use dropzone_common::fingerprint::fingerprint_file;
//! use dropzone_common::types::FingerprintAlgorithm;
//!
//! fn show(path: &str) -> Result<()> {
//!     let digest = fingerprint_file(path, FingerprintAlgorithm::Sha256)?;
//!     tracing::info!(%digest, "fingerprinted");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{Category, FingerprintAlgorithm, LedgerEntry};
