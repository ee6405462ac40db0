//! Deposition service trait, access tokens, and deposition state.
//!
//! The `DepositionService` trait abstracts over the DOI-issuing repository so
//! the orchestrator can be driven against the real API ([`ZenodoClient`]) or
//! a stub in tests.
//!
//! [`ZenodoClient`]: crate::zenodo::ZenodoClient

use std::fmt;
use std::path::Path;

use depo_core::Environment;
use serde::{Deserialize, Serialize};

use crate::error::{DepositError, Result};
use crate::manifest::MetadataManifest;

/// Scope required to create depositions, edit metadata, and upload files.
pub const SCOPE_WRITE: &str = "deposit:write";
/// Scope required to publish a deposition.
pub const SCOPE_ACTIONS: &str = "deposit:actions";

/// Default per-file upload limit (50 GB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1_000_000_000;

/// A bearer token together with the scopes it was issued with.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    scopes: Vec<String>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, scopes: Vec<String>) -> Self {
        AccessToken {
            secret: secret.into(),
            scopes,
        }
    }

    /// Read the token from an environment variable.
    ///
    /// A missing or empty variable is `AuthRequired`; it is a precondition
    /// failure, never retried.
    pub fn from_env(var: &str, scopes: Vec<String>) -> Result<Self> {
        match std::env::var(var) {
            Ok(secret) if !secret.trim().is_empty() => Ok(AccessToken::new(secret.trim(), scopes)),
            _ => Err(DepositError::AuthRequired {
                detail: format!("{var} is not set; create a personal access token for the deposit service"),
            }),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Fail fast unless the token declares `scope`.
    pub fn require(&self, scope: &str, operation: &str) -> Result<()> {
        if self.scopes.iter().any(|s| s == scope) {
            Ok(())
        } else {
            Err(DepositError::InsufficientScope {
                required: scope.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Lifecycle state of a deposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositionState {
    Draft,
    FilesUploaded,
    Published,
}

/// A deposition as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposition {
    pub id: u64,
    pub environment: Environment,
    pub state: DepositionState,
    pub record_id: Option<u64>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Names of files attached so far.
    pub files: Vec<String>,
}

impl Deposition {
    /// The published record, if the deposition has been published.
    pub fn published_record(&self) -> Option<PublishedRecord> {
        if self.state != DepositionState::Published {
            return None;
        }
        let record_id = self.record_id.unwrap_or(self.id);
        Some(PublishedRecord {
            record_id,
            doi: self
                .doi
                .clone()
                .unwrap_or_else(|| self.environment.doi_for(record_id)),
            url: self
                .url
                .clone()
                .unwrap_or_else(|| self.environment.record_url(record_id)),
        })
    }
}

/// Identifiers of a published record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub record_id: u64,
    pub doi: String,
    pub url: String,
}

/// Abstract deposit service backend, bound to one environment.
///
/// Operations other than `create` are idempotent for a given deposition id.
pub trait DepositionService {
    /// Environment this client writes to.
    fn environment(&self) -> Environment;

    /// Per-file upload limit published by the service.
    fn max_file_bytes(&self) -> u64 {
        DEFAULT_MAX_FILE_BYTES
    }

    /// Check declared token scopes before any write is attempted.
    fn check_scopes(&self) -> Result<()> {
        Ok(())
    }

    /// Create a new draft deposition. Never reuses an existing draft.
    fn create(&self, metadata: &MetadataManifest) -> Result<u64>;

    /// Fetch the current state of a deposition.
    fn fetch(&self, deposition_id: u64) -> Result<Deposition>;

    /// Overwrite the deposition's metadata.
    fn attach_metadata(&self, deposition_id: u64, metadata: &MetadataManifest) -> Result<()>;

    /// Upload a local file, replacing any file of the same name.
    fn upload(&self, deposition_id: u64, local_path: &Path) -> Result<()>;

    /// Publish the deposition; a no-op returning the record if already published.
    fn publish(&self, deposition_id: u64) -> Result<PublishedRecord>;
}

/// Fail with `FileTooLarge` if `size` exceeds `limit`.
pub fn check_file_size(path: &Path, size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(DepositError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = AccessToken::new("s3cr3t", vec![SCOPE_WRITE.into()]);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("deposit:write"));
    }

    #[test]
    fn missing_scope_fails_fast() {
        let token = AccessToken::new("t", vec![SCOPE_WRITE.into()]);
        token.require(SCOPE_WRITE, "upload files").unwrap();
        let err = token.require(SCOPE_ACTIONS, "publish").unwrap_err();
        assert!(matches!(err, DepositError::InsufficientScope { .. }));
        assert!(err.to_string().contains("deposit:actions"));
    }

    #[test]
    fn missing_env_token_is_auth_required() {
        let err = AccessToken::from_env("DEPO_TEST_TOKEN_THAT_IS_NEVER_SET", vec![]).unwrap_err();
        assert!(matches!(err, DepositError::AuthRequired { .. }));
    }

    #[test]
    fn published_record_falls_back_to_environment_shape() {
        let dep = Deposition {
            id: 42,
            environment: Environment::Production,
            state: DepositionState::Published,
            record_id: Some(43),
            doi: None,
            url: None,
            files: vec![],
        };
        let record = dep.published_record().unwrap();
        assert_eq!(record.doi, "10.5281/zenodo.43");
        assert_eq!(record.url, "https://zenodo.org/records/43");

        let draft = Deposition {
            state: DepositionState::Draft,
            ..dep
        };
        assert!(draft.published_record().is_none());
    }

    #[test]
    fn size_limit() {
        check_file_size(Path::new("a"), 10, 10).unwrap();
        assert!(matches!(
            check_file_size(Path::new("a"), 11, 10),
            Err(DepositError::FileTooLarge { .. })
        ));
    }
}
