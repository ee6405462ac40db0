//! Releases, their assets, and the source-hosting capability that serves them.

use std::io::Write;

use depo_core::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A tagged release on the source-hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub assets: Vec<Asset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
    pub size_bytes: u64,
    /// Digest published by the host, when it reports one.
    pub content_hash: Option<ContentHash>,
}

impl Release {
    /// Total bytes across all assets.
    pub fn total_bytes(&self) -> u64 {
        self.assets.iter().map(|a| a.size_bytes).sum()
    }

    /// `owner/repo@tag`, for messages.
    pub fn label(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.tag)
    }
}

/// Read-only access to releases on a source-hosting service.
///
/// Implementations must be shareable across download worker threads.
pub trait ReleaseSource: Send + Sync {
    /// Resolve the release whose tag matches `tag` exactly.
    ///
    /// Fails with `NotFound` when no such release exists and `AuthRequired`
    /// when the host refuses anonymous access.
    fn release(&self, owner: &str, repo: &str, tag: &str) -> Result<Release>;

    /// Stream an asset's bytes into `sink`, returning the number written.
    ///
    /// The byte count is checked by the caller; implementations should not
    /// treat a short body as success or failure on their own.
    fn fetch(&self, asset: &Asset, sink: &mut dyn Write) -> Result<u64>;
}
