//! `depo status`: show recorded deployments.

use std::path::Path;

use anyhow::Result;
use depo_core::Environment;
use depo_deposit::{read_result, DeploymentCheckpoint, DeploymentStore};

use crate::config::DeployConfig;

/// Run `depo status [--tag <tag>] [--environment <env>]`.
pub fn run(
    project_dir: &Path,
    config: &DeployConfig,
    tag: Option<&str>,
    environment: Option<Environment>,
) -> Result<()> {
    let store = DeploymentStore::new(project_dir.join(&config.state_file));
    let checkpoints: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|c| tag.map_or(true, |t| c.tag == t))
        .filter(|c| environment.map_or(true, |e| c.environment == e))
        .collect();

    if checkpoints.is_empty() {
        println!("No recorded deployments in {}", store.path().display());
    } else {
        print!("{}", format_checkpoints(&checkpoints));
    }

    let result_path = project_dir.join(&config.result_file);
    if let Some(result) = read_result(&result_path)? {
        println!(
            "Last successful deployment ({}): {} → {} ({})",
            result_path.display(),
            result.tag,
            result.doi,
            result.timestamp
        );
    }
    Ok(())
}

/// One line per checkpoint, plus identifiers once known.
pub fn format_checkpoints(checkpoints: &[DeploymentCheckpoint]) -> String {
    let mut out = String::new();
    for cp in checkpoints {
        out.push_str(&format!(
            "{}/{}: {} (updated {})\n",
            cp.environment,
            cp.tag,
            cp.stage,
            cp.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(id) = cp.deposition_id {
            out.push_str(&format!("  deposition {id}"));
            if !cp.uploaded.is_empty() {
                out.push_str(&format!(", uploaded: {}", cp.uploaded.join(", ")));
            }
            out.push('\n');
        }
        if let Some(result) = &cp.result {
            out.push_str(&format!("  DOI {} ({})\n", result.doi, result.url));
        }
    }
    out
}
