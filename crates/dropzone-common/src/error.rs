//! Error types shared across Dropzone crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Unsupported fingerprint algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidCategory("orders".to_string());
        assert_eq!(err.to_string(), "Invalid category: orders");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
