//! `depo deploy`: archive a tagged release and mint a DOI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use depo_core::Environment;
use depo_deposit::{
    AccessToken, AssetCache, CacheOptions, DepositError, DepositionService, DeployFailure,
    DeployRequest, DeployStatus, Deployer, DeploymentReport, DeploymentStore, GitHubSource,
    MetadataManifest, ReleaseSource, Stage, Step, ZenodoClient,
};

use super::ConfigError;
use crate::config::DeployConfig;

/// Deposit service token; never read from a file.
pub const TOKEN_VAR: &str = "ZENODO_TOKEN";
/// Optional token for private source repositories.
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Flags of `depo deploy`; unset values fall back to `[deploy]`.
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub tag: String,
    pub environment: Option<Environment>,
    pub skip_download: bool,
    pub force_download: bool,
    pub metadata: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

/// Everything a deployment needs once preflight has passed.
pub struct Plan {
    pub request: DeployRequest,
    pub environment: Environment,
    pub token: AccessToken,
    pub manifest: MetadataManifest,
    pub cache: AssetCache,
    pub store: DeploymentStore,
    pub result_path: PathBuf,
    pub timeout: Duration,
}

fn preflight(source: DepositError) -> DeployFailure {
    DeployFailure {
        step: Step::Preflight,
        reached: Stage::Start,
        source,
    }
}

/// Run `depo deploy`.
pub fn run(project_dir: &Path, config: &DeployConfig, args: &DeployArgs) -> Result<()> {
    let plan = prepare(project_dir, config, args, TOKEN_VAR)?;

    let github_token = std::env::var(GITHUB_TOKEN_VAR)
        .ok()
        .filter(|t| !t.trim().is_empty());
    let source = GitHubSource::new(github_token, plan.timeout).map_err(preflight)?;
    let service = ZenodoClient::new(plan.environment, plan.token.clone(), plan.timeout)
        .map_err(preflight)?
        .with_max_file_bytes(config.max_file_bytes)
        .with_retry(config.retry_policy());

    let report = execute(&plan, &source, &service)?;
    print!("{}", format_report(&report, plan.environment, &plan.result_path));
    Ok(())
}

/// Resolve settings and run every check that needs no network: the target
/// repository and environment, the token, and the metadata manifest.
pub fn prepare(
    project_dir: &Path,
    config: &DeployConfig,
    args: &DeployArgs,
    token_var: &str,
) -> Result<Plan> {
    let owner = args
        .owner
        .clone()
        .or_else(|| config.owner.clone())
        .ok_or_else(|| ConfigError("no repository owner: pass --owner or set deploy.owner".into()))?;
    let repo = args
        .repo
        .clone()
        .or_else(|| config.repo.clone())
        .ok_or_else(|| ConfigError("no repository name: pass --repo or set deploy.repo".into()))?;
    let environment = args.environment.or(config.environment).ok_or_else(|| {
        ConfigError("no environment: pass --environment sandbox|production or set deploy.environment".into())
    })?;
    if args.skip_download && args.force_download {
        return Err(ConfigError("--skip-download and --force-download are mutually exclusive".into()).into());
    }

    let token = AccessToken::from_env(token_var, config.token_scopes.clone()).map_err(preflight)?;
    let metadata_path = project_dir.join(args.metadata.as_ref().unwrap_or(&config.metadata));
    let manifest = MetadataManifest::load(&metadata_path).map_err(preflight)?;

    let cache_dir = project_dir.join(args.cache_dir.as_ref().unwrap_or(&config.cache_dir));
    let cache = AssetCache::new(
        cache_dir,
        CacheOptions {
            skip_acquisition: args.skip_download,
            force: args.force_download,
            retry: config.retry_policy(),
            workers: config.download_workers.max(1),
        },
    );

    Ok(Plan {
        request: DeployRequest {
            owner,
            repo,
            tag: args.tag.clone(),
        },
        environment,
        token,
        manifest,
        cache,
        store: DeploymentStore::new(project_dir.join(&config.state_file)),
        result_path: project_dir.join(&config.result_file),
        timeout: Duration::from_secs(config.timeout_secs.max(1)),
    })
}

/// Drive the orchestrator with the given backends.
pub fn execute(
    plan: &Plan,
    source: &dyn ReleaseSource,
    service: &dyn DepositionService,
) -> std::result::Result<DeploymentReport, DeployFailure> {
    tracing::info!(
        "deploying {}/{}@{} to {}",
        plan.request.owner,
        plan.request.repo,
        plan.request.tag,
        plan.environment
    );
    Deployer::new(
        source,
        service,
        &plan.cache,
        &plan.store,
        plan.result_path.clone(),
    )
    .run(&plan.request, &plan.manifest)
}

/// Human-readable summary of a finished deployment.
pub fn format_report(report: &DeploymentReport, environment: Environment, result_path: &Path) -> String {
    let headline = match report.status {
        DeployStatus::Published => "Published",
        DeployStatus::Resumed => "Published (resumed)",
        DeployStatus::AlreadyPublished => "Already published",
    };
    let result = &report.result;
    let mut out = format!("{headline}: {} to {environment}\n", result.tag);
    out.push_str(&format!("  Deposition: {}\n", result.deposition_id));
    out.push_str(&format!("  Record:     {}\n", result.record_id));
    out.push_str(&format!("  DOI:        {}\n", result.doi));
    out.push_str(&format!("  URL:        {}\n", result.url));
    if !report.uploaded.is_empty() {
        out.push_str(&format!("  Uploaded:   {}\n", report.uploaded.join(", ")));
    }
    out.push_str(&format!("  Saved to {}\n", result_path.display()));
    out
}
