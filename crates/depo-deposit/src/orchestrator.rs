//! Deployment orchestrator: release → assets → deposition → published record.
//!
//! The lifecycle is a linear state machine:
//!
//! ```text
//! START → ASSETS_RESOLVED → ASSETS_CACHED → DEPOSITION_CREATED
//!       → METADATA_ATTACHED → FILES_UPLOADED → PUBLISHED
//! ```
//!
//! Each transition is attempted once per run. Once a deposition exists, the
//! reached state is checkpointed after every transition, so a re-run after
//! a failure or interrupt picks up where the last one stopped instead of
//! creating a second deposition.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::AssetCache;
use crate::client::{check_file_size, DepositionService, PublishedRecord};
use crate::error::DepositError;
use crate::manifest::MetadataManifest;
use crate::record::{
    read_result, write_result, DeploymentCheckpoint, DeploymentResult, DeploymentStore,
};
use crate::release::ReleaseSource;

/// Lifecycle states of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    AssetsResolved,
    AssetsCached,
    DepositionCreated,
    MetadataAttached,
    FilesUploaded,
    Published,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "START",
            Stage::AssetsResolved => "ASSETS_RESOLVED",
            Stage::AssetsCached => "ASSETS_CACHED",
            Stage::DepositionCreated => "DEPOSITION_CREATED",
            Stage::MetadataAttached => "METADATA_ATTACHED",
            Stage::FilesUploaded => "FILES_UPLOADED",
            Stage::Published => "PUBLISHED",
        };
        f.write_str(s)
    }
}

/// The unit of work that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Token, manifest, scope, or checkpoint checks before any network call.
    Preflight,
    /// Looking up an existing deposition recorded by an earlier run.
    Resume,
    Resolve,
    Cache,
    Create,
    AttachMetadata,
    Upload,
    Publish,
    /// Writing the checkpoint or result file.
    Persist,
}

impl Step {
    /// Process exit code reported when this step fails.
    pub fn exit_code(self) -> i32 {
        match self {
            Step::Preflight => 2,
            Step::Resolve => 10,
            Step::Cache => 11,
            Step::Create => 12,
            Step::AttachMetadata => 13,
            Step::Upload => 14,
            Step::Publish => 15,
            Step::Persist => 16,
            Step::Resume => 17,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Preflight => "preflight checks",
            Step::Resume => "resuming recorded deposition",
            Step::Resolve => "resolving release assets",
            Step::Cache => "caching assets",
            Step::Create => "creating deposition",
            Step::AttachMetadata => "attaching metadata",
            Step::Upload => "uploading files",
            Step::Publish => "publishing",
            Step::Persist => "persisting deployment state",
        };
        f.write_str(s)
    }
}

/// A halted deployment: which step failed, how far the run got, and why.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed (last completed state: {reached}): {source}")]
pub struct DeployFailure {
    pub step: Step,
    pub reached: Stage,
    #[source]
    pub source: DepositError,
}

impl DeployFailure {
    pub fn exit_code(&self) -> i32 {
        self.step.exit_code()
    }
}

/// Which release to deploy.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub owner: String,
    pub repo: String,
    pub tag: String,
}

/// How a successful run reached `PUBLISHED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    /// Full lifecycle in this run.
    Published,
    /// Continued a deposition recorded by an interrupted run.
    Resumed,
    /// Nothing to do; the recorded result was reported.
    AlreadyPublished,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub result: DeploymentResult,
    pub status: DeployStatus,
    /// Files uploaded during this run.
    pub uploaded: Vec<String>,
}

/// Drives one deployment through the lifecycle.
pub struct Deployer<'a> {
    source: &'a dyn ReleaseSource,
    service: &'a dyn DepositionService,
    cache: &'a AssetCache,
    store: &'a DeploymentStore,
    result_path: PathBuf,
}

type StepResult<T> = std::result::Result<T, DeployFailure>;

trait Halt<T> {
    fn halt(self, step: Step, reached: Stage) -> StepResult<T>;
}

impl<T> Halt<T> for crate::error::Result<T> {
    fn halt(self, step: Step, reached: Stage) -> StepResult<T> {
        self.map_err(|source| DeployFailure {
            step,
            reached,
            source,
        })
    }
}

impl<'a> Deployer<'a> {
    pub fn new(
        source: &'a dyn ReleaseSource,
        service: &'a dyn DepositionService,
        cache: &'a AssetCache,
        store: &'a DeploymentStore,
        result_path: PathBuf,
    ) -> Self {
        Deployer {
            source,
            service,
            cache,
            store,
            result_path,
        }
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Run the deployment for `request` using `manifest` as deposition metadata.
    pub fn run(&self, request: &DeployRequest, manifest: &MetadataManifest) -> StepResult<DeploymentReport> {
        let environment = self.service.environment();

        manifest.validate().halt(Step::Preflight, Stage::Start)?;
        self.service.check_scopes().halt(Step::Preflight, Stage::Start)?;
        let mut checkpoint = self
            .store
            .load(environment, &request.tag)
            .halt(Step::Preflight, Stage::Start)?
            .unwrap_or_else(|| DeploymentCheckpoint::new(&request.tag, environment));

        if let Some(result) = checkpoint.published() {
            info!(
                "{} already published to {environment} as {}; not creating a new deposition",
                request.tag, result.doi
            );
            let result = result.clone();
            self.restore_result_file(&result)
                .halt(Step::Persist, Stage::Published)?;
            return Ok(DeploymentReport {
                result,
                status: DeployStatus::AlreadyPublished,
                uploaded: Vec::new(),
            });
        }

        let mut status = DeployStatus::Published;
        if let Some(id) = checkpoint.deposition_id {
            match self.service.fetch(id) {
                Ok(deposition) => {
                    status = DeployStatus::Resumed;
                    if let Some(record) = deposition.published_record() {
                        info!("deposition {id} was published by an earlier run; recording it");
                        return self.finish(checkpoint, id, record, request, status, Vec::new());
                    }
                    info!("resuming deposition {id} from {}", checkpoint.stage);
                    checkpoint.uploaded = deposition.files;
                }
                Err(DepositError::NotFound { .. }) => {
                    warn!("recorded deposition {id} no longer exists; starting over");
                    self.store
                        .remove(environment, &request.tag)
                        .halt(Step::Persist, checkpoint.stage)?;
                    checkpoint = DeploymentCheckpoint::new(&request.tag, environment);
                }
                Err(e) => return Err(e).halt(Step::Resume, checkpoint.stage),
            }
        }

        let mut uploaded_now = Vec::new();
        if checkpoint.stage < Stage::FilesUploaded {
            uploaded_now = self.acquire_and_upload(request, manifest, &mut checkpoint)?;
        }

        let id = checkpoint
            .deposition_id
            .ok_or_else(|| DepositError::State {
                path: self.store.path().to_path_buf(),
                detail: format!("checkpoint for {} has no deposition id", request.tag),
            })
            .halt(Step::Resume, checkpoint.stage)?;
        let record = self.service.publish(id).halt(Step::Publish, checkpoint.stage)?;
        self.finish(checkpoint, id, record, request, status, uploaded_now)
    }

    /// START (or a resumed early stage) through FILES_UPLOADED.
    fn acquire_and_upload(
        &self,
        request: &DeployRequest,
        manifest: &MetadataManifest,
        checkpoint: &mut DeploymentCheckpoint,
    ) -> StepResult<Vec<String>> {
        let mut reached = checkpoint.stage;

        let release = self
            .source
            .release(&request.owner, &request.repo, &request.tag)
            .halt(Step::Resolve, reached)?;
        if release.assets.is_empty() {
            return Err(DepositError::NoAssets {
                tag: request.tag.clone(),
            })
            .halt(Step::Resolve, reached);
        }
        let limit = self.service.max_file_bytes();
        for asset in &release.assets {
            check_file_size(Path::new(&asset.name), asset.size_bytes, limit)
                .halt(Step::Resolve, reached)?;
        }
        reached = reached.max(Stage::AssetsResolved);
        info!(
            "resolved {} with {} asset(s), {} bytes",
            release.label(),
            release.assets.len(),
            release.total_bytes()
        );

        let paths = self
            .cache
            .ensure_all(self.source, &release.assets)
            .halt(Step::Cache, reached)?;
        reached = reached.max(Stage::AssetsCached);

        let id = match checkpoint.deposition_id {
            Some(id) => id,
            None => {
                let id = self.service.create(manifest).halt(Step::Create, reached)?;
                checkpoint.deposition_id = Some(id);
                reached = Stage::DepositionCreated;
                self.checkpoint(checkpoint, reached)?;
                id
            }
        };

        self.service
            .attach_metadata(id, manifest)
            .halt(Step::AttachMetadata, reached)?;
        reached = reached.max(Stage::MetadataAttached);
        self.checkpoint(checkpoint, reached)?;

        let mut uploaded_now = Vec::new();
        for path in &paths {
            let name = file_name(path);
            if checkpoint.uploaded.contains(&name) {
                info!("{name} already attached to deposition {id}; skipping upload");
                continue;
            }
            self.service.upload(id, path).halt(Step::Upload, reached)?;
            checkpoint.uploaded.push(name.clone());
            uploaded_now.push(name);
            self.checkpoint(checkpoint, reached)?;
        }

        self.checkpoint(checkpoint, Stage::FilesUploaded)?;
        Ok(uploaded_now)
    }

    fn checkpoint(&self, checkpoint: &mut DeploymentCheckpoint, stage: Stage) -> StepResult<()> {
        checkpoint.stage = stage;
        self.store.save(checkpoint).halt(Step::Persist, stage)
    }

    /// PUBLISHED: record the checkpoint first, then the result file.
    fn finish(
        &self,
        mut checkpoint: DeploymentCheckpoint,
        deposition_id: u64,
        record: PublishedRecord,
        request: &DeployRequest,
        status: DeployStatus,
        uploaded: Vec<String>,
    ) -> StepResult<DeploymentReport> {
        let environment = self.service.environment();
        if !environment.doi_matches(&record.doi, record.record_id) {
            warn!(
                "DOI {} does not have the expected {environment} shape {}",
                record.doi,
                environment.doi_for(record.record_id)
            );
        }

        let result = DeploymentResult {
            timestamp: Utc::now().to_rfc3339(),
            deposition_id,
            record_id: record.record_id,
            doi: record.doi,
            url: record.url,
            tag: request.tag.clone(),
        };
        checkpoint.result = Some(result.clone());
        self.checkpoint(&mut checkpoint, Stage::Published)?;
        write_result(&self.result_path, &result).halt(Step::Persist, Stage::Published)?;
        info!("{} published: DOI {}", request.tag, result.doi);

        Ok(DeploymentReport {
            result,
            status,
            uploaded,
        })
    }

    /// Re-create the result file if an earlier run recorded success but the file is gone.
    /// Make the result file describe `result`, e.g. after it was deleted or
    /// overwritten by a deployment of the same tag to the other environment.
    fn restore_result_file(&self, result: &DeploymentResult) -> crate::error::Result<()> {
        if read_result(&self.result_path)?.as_ref() != Some(result) {
            write_result(&self.result_path, result)?;
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
