//! Content fingerprints for change detection
//!
//! A fingerprint is a lowercase hex digest of a file's full byte content. It
//! is a dedup key, not a security primitive.

use crate::error::Result;
use crate::types::FingerprintAlgorithm;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint an in-memory buffer
pub fn fingerprint(bytes: &[u8], algorithm: FingerprintAlgorithm) -> String {
    match algorithm {
        FingerprintAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        FingerprintAlgorithm::Md5 => format!("{:x}", md5::compute(bytes)),
    }
}

/// Read a file fully and fingerprint its bytes
pub fn fingerprint_file(path: impl AsRef<Path>, algorithm: FingerprintAlgorithm) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint(&bytes, algorithm))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_fingerprint_sha256() {
        assert_eq!(
            fingerprint(b"hello world", FingerprintAlgorithm::Sha256),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_fingerprint_md5() {
        assert_eq!(
            fingerprint(b"Hello, world!", FingerprintAlgorithm::Md5),
            "6cd3556deb0da54bca060b4c39479839"
        );
    }

    #[test]
    fn test_fingerprint_empty_input() {
        assert_eq!(
            fingerprint(b"", FingerprintAlgorithm::Sha256),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let a = fingerprint(b"region,units\nnorth,10\n", FingerprintAlgorithm::Sha256);
        let b = fingerprint(b"region,units\nnorth,11\n", FingerprintAlgorithm::Sha256);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_file_matches_buffer() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test data").unwrap();
        file.flush().unwrap();

        let from_file = fingerprint_file(file.path(), FingerprintAlgorithm::Md5).unwrap();
        assert_eq!(from_file, "eb733a00c0c9d336e65691a37ab54293");
        assert_eq!(from_file, fingerprint(b"test data", FingerprintAlgorithm::Md5));
    }

    #[test]
    fn test_fingerprint_file_missing() {
        assert!(fingerprint_file("/nonexistent/file.csv", FingerprintAlgorithm::Sha256).is_err());
    }
}
