//! Core error types.

use std::path::PathBuf;

/// Errors raised by the shared hashing and file helpers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A hash string was not a 64-character lowercase hex digest.
    #[error("invalid content hash '{value}': {detail}")]
    InvalidHash { value: String, detail: String },

    /// An environment name was not recognised.
    #[error("unknown environment '{0}' (expected 'sandbox' or 'production')")]
    UnknownEnvironment(String),

    /// A file could not be read, written, or renamed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
