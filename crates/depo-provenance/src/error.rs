//! Provenance error types.

use std::path::PathBuf;

use depo_core::CoreError;

/// Errors raised while reading the ledger, scanning, or rendering.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// A ledger row (or the header) could not be parsed.
    #[error("{}:{line}: {detail}", path.display())]
    Ledger {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// A record cannot be written as a single ledger row.
    #[error("invalid audit record for '{figure_id}': {detail}")]
    InvalidRecord { figure_id: String, detail: String },

    /// Walking the repository tree failed.
    #[error("cannot scan {}: {detail}", path.display())]
    Scan { path: PathBuf, detail: String },

    /// A template, ledger, or output file could not be read or written.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ProvenanceError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| ProvenanceError::Io { path, source }
    }
}

/// Result type alias for provenance operations.
pub type Result<T> = std::result::Result<T, ProvenanceError>;
