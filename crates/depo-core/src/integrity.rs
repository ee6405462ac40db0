//! Content-addressed integrity verification.
//!
//! Release assets and audited artifacts are identified by the SHA-256 digest
//! of their bytes, rendered as lowercase hex.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        ContentHash(hex::encode(Sha256::digest(data)))
    }

    /// Hash a file by streaming it in fixed-size chunks.
    pub fn compute_file(path: &Path) -> Result<Self> {
        let io_err = |source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(io_err)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0_u8; 64 * 1024];
        loop {
            let read = file.read(&mut buf).map_err(io_err)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(ContentHash(hex::encode(hasher.finalize())))
    }

    /// Parse a hex digest, accepting an optional `sha256:` prefix.
    pub fn parse(value: &str) -> Result<Self> {
        let hex_part = value.strip_prefix("sha256:").unwrap_or(value).trim();
        let decoded = hex::decode(hex_part).map_err(|e| CoreError::InvalidHash {
            value: value.to_string(),
            detail: e.to_string(),
        })?;
        if decoded.len() != 32 {
            return Err(CoreError::InvalidHash {
                value: value.to_string(),
                detail: format!("expected 32 bytes, got {}", decoded.len()),
            });
        }
        Ok(ContentHash(hex::encode(decoded)))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that the given data matches this hash.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data) == *self
    }

    /// Verify that the file at `path` currently matches this hash.
    pub fn verify_file(&self, path: &Path) -> Result<bool> {
        Ok(ContentHash::compute_file(path)? == *self)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHash::compute(data), ContentHash::compute(data));
    }

    #[test]
    fn hash_differs_for_different_data() {
        assert_ne!(ContentHash::compute(b"hello"), ContentHash::compute(b"world"));
    }

    #[test]
    fn hash_format() {
        let hash = ContentHash::compute(b"");
        // SHA-256 of empty is well-known
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        let data = vec![7_u8; 200_000];
        std::fs::write(&path, &data).unwrap();

        let hash = ContentHash::compute_file(&path).unwrap();
        assert_eq!(hash, ContentHash::compute(&data));
        assert!(hash.verify_file(&path).unwrap());

        std::fs::write(&path, b"changed").unwrap();
        assert!(!hash.verify_file(&path).unwrap());
    }

    #[test]
    fn parse_accepts_prefixed_digest() {
        let hash = ContentHash::compute(b"asset");
        let prefixed = format!("sha256:{}", hash.as_str().to_uppercase());
        assert_eq!(ContentHash::parse(&prefixed).unwrap(), hash);
    }

    #[test]
    fn parse_rejects_short_digest() {
        assert!(ContentHash::parse("abcd").is_err());
        assert!(ContentHash::parse("not-hex").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ContentHash::compute_file(Path::new("/nonexistent/figure.pdf")).unwrap_err();
        assert!(err.to_string().contains("figure.pdf"));
    }
}
