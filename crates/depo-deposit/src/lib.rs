//! Release archival to a DOI-issuing deposit service.
//!
//! Takes a tagged release from a code hosting service, caches its assets
//! locally, and carries them through the deposition lifecycle until a DOI
//! is minted.
//!
//! # Architecture
//!
//! - **Sources** ([`ReleaseSource`]): resolve a release and stream its assets.
//! - **Cache** ([`AssetCache`]): verified, atomically-renamed local copies.
//! - **Services** ([`DepositionService`]): create, describe, upload, publish.
//! - **Orchestrator** ([`Deployer`]): the resumable state machine tying the
//!   three together, checkpointed in a [`DeploymentStore`].

pub mod cache;
pub mod client;
pub mod error;
pub mod github;
pub mod http;
pub mod manifest;
pub mod orchestrator;
pub mod record;
pub mod release;
pub mod retry;
pub mod zenodo;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience.
pub use cache::{AssetCache, CacheOptions};
pub use client::{
    AccessToken, Deposition, DepositionService, DepositionState, PublishedRecord,
    DEFAULT_MAX_FILE_BYTES, SCOPE_ACTIONS, SCOPE_WRITE,
};
pub use error::{DepositError, Result};
pub use github::GitHubSource;
pub use manifest::{Author, MetadataManifest, RelatedIdentifier};
pub use orchestrator::{
    DeployFailure, DeployRequest, DeployStatus, Deployer, DeploymentReport, Stage, Step,
};
pub use record::{
    read_result, write_result, DeploymentCheckpoint, DeploymentResult, DeploymentStore,
};
pub use release::{Asset, Release, ReleaseSource};
pub use retry::RetryPolicy;
pub use zenodo::ZenodoClient;
