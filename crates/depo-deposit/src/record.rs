//! Persisted deployment state.
//!
//! Two files live on disk:
//! - the **checkpoint file** (default `.depo/deployments.json`): one
//!   [`DeploymentCheckpoint`] per `(environment, tag)` pair, rewritten after
//!   every lifecycle transition so an interrupted run can resume;
//! - the **result file** (default `zenodo_release.json`): the
//!   [`DeploymentResult`] of the last successful run, written only on success.
//!
//! Both are replaced atomically; a failed run never leaves a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use depo_core::{write_atomic, Environment};
use serde::{Deserialize, Serialize};

use crate::error::{DepositError, Result};
use crate::orchestrator::Stage;

/// Write-once record of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// ISO-8601 time the deployment completed.
    pub timestamp: String,
    pub deposition_id: u64,
    pub record_id: u64,
    pub doi: String,
    pub url: String,
    pub tag: String,
}

/// Progress of one `(environment, tag)` deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCheckpoint {
    pub tag: String,
    pub environment: Environment,
    /// Last state reached.
    pub stage: Stage,
    #[serde(default)]
    pub deposition_id: Option<u64>,
    /// Files already uploaded to the deposition.
    #[serde(default)]
    pub uploaded: Vec<String>,
    #[serde(default)]
    pub result: Option<DeploymentResult>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentCheckpoint {
    pub fn new(tag: &str, environment: Environment) -> Self {
        DeploymentCheckpoint {
            tag: tag.to_string(),
            environment,
            stage: Stage::Start,
            deposition_id: None,
            uploaded: Vec::new(),
            result: None,
            updated_at: Utc::now(),
        }
    }

    /// The completed result, when this checkpoint is terminal.
    pub fn published(&self) -> Option<&DeploymentResult> {
        if self.stage == Stage::Published {
            self.result.as_ref()
        } else {
            None
        }
    }
}

/// File-backed map of deployment checkpoints.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    path: PathBuf,
}

type CheckpointMap = BTreeMap<String, DeploymentCheckpoint>;

fn key(environment: Environment, tag: &str) -> String {
    format!("{environment}/{tag}")
}

impl DeploymentStore {
    pub fn new(path: PathBuf) -> Self {
        DeploymentStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the checkpoint for a pair, if one was recorded.
    pub fn load(&self, environment: Environment, tag: &str) -> Result<Option<DeploymentCheckpoint>> {
        Ok(self.read_all()?.remove(&key(environment, tag)))
    }

    /// All recorded checkpoints, ordered by environment then tag.
    pub fn list(&self) -> Result<Vec<DeploymentCheckpoint>> {
        Ok(self.read_all()?.into_values().collect())
    }

    /// Insert or replace a checkpoint (read-modify-write, atomic replace).
    pub fn save(&self, checkpoint: &DeploymentCheckpoint) -> Result<()> {
        let mut all = self.read_all()?;
        let mut checkpoint = checkpoint.clone();
        checkpoint.updated_at = Utc::now();
        all.insert(key(checkpoint.environment, &checkpoint.tag), checkpoint);
        self.write_all(&all)
    }

    /// Forget a pair, e.g. when its remote draft no longer exists.
    pub fn remove(&self, environment: Environment, tag: &str) -> Result<bool> {
        let mut all = self.read_all()?;
        let removed = all.remove(&key(environment, tag)).is_some();
        if removed {
            self.write_all(&all)?;
        }
        Ok(removed)
    }

    fn read_all(&self) -> Result<CheckpointMap> {
        if !self.path.is_file() {
            return Ok(CheckpointMap::new());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| DepositError::State {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&data).map_err(|e| DepositError::State {
            path: self.path.clone(),
            detail: format!("corrupt checkpoint file: {e}"),
        })
    }

    fn write_all(&self, all: &CheckpointMap) -> Result<()> {
        let data = serde_json::to_string_pretty(all)?;
        write_atomic(&self.path, data.as_bytes())?;
        Ok(())
    }
}

/// Read an existing result file, if present.
pub fn read_result(path: &Path) -> Result<Option<DeploymentResult>> {
    if !path.is_file() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let result = serde_json::from_str(&data).map_err(|e| DepositError::State {
        path: path.to_path_buf(),
        detail: format!("corrupt result file: {e}"),
    })?;
    Ok(Some(result))
}

/// Atomically write the result file.
pub fn write_result(path: &Path, result: &DeploymentResult) -> Result<()> {
    let mut data = serde_json::to_string_pretty(result)?;
    data.push('\n');
    write_atomic(path, data.as_bytes())?;
    Ok(())
}
