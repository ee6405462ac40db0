//! Deposition error types.

use std::path::PathBuf;

/// Errors that can occur while acquiring assets or talking to the deposit service.
#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    /// No matching release or deposition exists.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Credentials are missing or were rejected.
    #[error("authentication required: {detail}")]
    AuthRequired { detail: String },

    /// The token does not declare a scope the operation needs.
    #[error("token is missing scope '{required}' needed to {operation}")]
    InsufficientScope { required: String, operation: String },

    /// An asset transfer ended with fewer (or more) bytes than reported.
    #[error("incomplete download of '{asset}': expected {expected} bytes, got {actual}")]
    IncompleteDownload {
        asset: String,
        expected: u64,
        actual: u64,
    },

    /// A network call exceeded its timeout.
    #[error("network timeout during {context}")]
    NetworkTimeout { context: String },

    /// A connection-level failure (reset, refused, DNS) or interrupted body.
    #[error("network error during {context}: {detail}")]
    Network { context: String, detail: String },

    /// The remote service answered with an unexpected status.
    #[error("{context} failed with HTTP {status}: {detail}")]
    Service {
        context: String,
        status: u16,
        detail: String,
    },

    /// A file exceeds the service's per-file limit.
    #[error("'{}' is {size} bytes, over the per-file limit of {limit} bytes", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Required deposition metadata is absent or malformed.
    #[error("invalid metadata: {detail}")]
    InvalidMetadata { detail: String },

    /// The metadata manifest file could not be read or parsed.
    #[error("cannot load metadata manifest {}: {detail}", path.display())]
    Manifest { path: PathBuf, detail: String },

    /// An asset has an unusable name or description.
    #[error("invalid asset '{name}': {detail}")]
    InvalidAsset { name: String, detail: String },

    /// Downloaded bytes do not match the published digest.
    #[error("checksum mismatch for '{asset}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    /// The release has nothing to deposit.
    #[error("release '{tag}' has no assets to deposit")]
    NoAssets { tag: String },

    /// The service returned a response missing a field we rely on.
    #[error("unexpected response from {context}: {detail}")]
    UnexpectedResponse { context: String, detail: String },

    /// Local cache I/O error.
    #[error("cache error at {}: {detail}", path.display())]
    CacheError { path: PathBuf, detail: String },

    /// Persisted state could not be read or written.
    #[error("state file {}: {detail}", path.display())]
    State { path: PathBuf, detail: String },

    /// Shared helper failure (hashing, atomic writes).
    #[error(transparent)]
    Core(#[from] depo_core::CoreError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DepositError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            DepositError::IncompleteDownload { .. }
            | DepositError::NetworkTimeout { .. }
            | DepositError::Network { .. } => true,
            DepositError::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classify a transport error from the HTTP client.
    pub(crate) fn from_http(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DepositError::NetworkTimeout {
                context: context.to_string(),
            }
        } else if let Some(status) = err.status() {
            DepositError::Service {
                context: context.to_string(),
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else {
            DepositError::Network {
                context: context.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

/// Result type alias for deposition operations.
pub type Result<T> = std::result::Result<T, DepositError>;
