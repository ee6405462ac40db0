//! `depo.toml` configuration.
//!
//! Tokens are never read from here; they come from `ZENODO_TOKEN` and
//! `GITHUB_TOKEN` in the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depo_core::Environment;
use depo_deposit::{RetryPolicy, DEFAULT_MAX_FILE_BYTES, SCOPE_ACTIONS, SCOPE_WRITE};
use depo_provenance::{DocumentOptions, ScanOptions};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "depo.toml";

/// The top-level configuration for a depo project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepoConfig {
    pub deploy: DeployConfig,
    pub document: DocumentConfig,
}

/// `[deploy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub environment: Option<Environment>,
    /// Metadata manifest, JSON or TOML.
    pub metadata: PathBuf,
    pub cache_dir: PathBuf,
    pub result_file: PathBuf,
    pub state_file: PathBuf,
    pub max_file_bytes: u64,
    pub download_workers: usize,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    /// Scopes the deposit token was issued with.
    pub token_scopes: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            owner: None,
            repo: None,
            environment: None,
            metadata: PathBuf::from(".zenodo.json"),
            cache_dir: PathBuf::from("releases"),
            result_file: PathBuf::from("zenodo_release.json"),
            state_file: PathBuf::from(".depo/deployments.json"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            download_workers: 4,
            timeout_secs: 60,
            retry_attempts: RetryPolicy::default().attempts,
            token_scopes: vec![SCOPE_WRITE.to_string(), SCOPE_ACTIONS.to_string()],
        }
    }
}

impl DeployConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

/// `[document]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Directory to scan, relative to the project.
    pub root: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
    pub ledger: PathBuf,
    /// Extra directory names or paths to skip while scanning.
    pub exclude: Vec<String>,
    pub figure_prefixes: Option<Vec<String>>,
    /// File-name substring → table description.
    pub descriptions: BTreeMap<String, String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig {
            root: PathBuf::from("."),
            template: PathBuf::from("docs/DATA_CODE_AVAILABILITY.template.md"),
            output: PathBuf::from("docs/DATA_CODE_AVAILABILITY.md"),
            ledger: PathBuf::from("provenance/audit_ledger.tsv"),
            exclude: Vec::new(),
            figure_prefixes: None,
            descriptions: BTreeMap::new(),
        }
    }
}

impl DocumentConfig {
    pub fn options(&self, timestamp: Option<String>) -> DocumentOptions {
        let mut scan = ScanOptions::default();
        scan.exclude.extend(self.exclude.iter().cloned());
        if let Some(prefixes) = &self.figure_prefixes {
            scan.figure_prefixes = prefixes.clone();
        }
        DocumentOptions {
            scan,
            descriptions: self.descriptions.clone(),
            timestamp,
            ..DocumentOptions::default()
        }
    }
}

impl DepoConfig {
    /// Search upward from `start_dir` for a `depo.toml` file, parse and return
    /// it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let config = DepoConfig::parse(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Load from the nearest `depo.toml`, or defaults rooted at `cwd`.
    pub fn load_or_default(cwd: &Path) -> Result<(Self, PathBuf)> {
        Ok(DepoConfig::find_and_load(cwd)?.unwrap_or_else(|| (DepoConfig::default(), cwd.to_path_buf())))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let config: DepoConfig = toml::from_str(s)?;
        Ok(config)
    }
}
