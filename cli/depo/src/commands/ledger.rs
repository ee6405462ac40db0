//! `depo ledger`: append to and inspect the audit ledger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depo_provenance::ledger::{format_date, parse_date};
use depo_provenance::{AuditLedger, AuditRecord};

use super::ConfigError;
use crate::config::DocumentConfig;

/// Flags of `depo ledger record`.
#[derive(Debug, Clone, Default)]
pub struct RecordArgs {
    pub figure_id: String,
    pub script: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub environment_version: Option<String>,
    pub dependency_versions: Option<String>,
    /// Execution date; defaults to now.
    pub date: Option<String>,
    pub ledger: Option<PathBuf>,
}

fn ledger_at(project_dir: &Path, config: &DocumentConfig, flag: Option<&PathBuf>) -> AuditLedger {
    AuditLedger::new(project_dir.join(flag.unwrap_or(&config.ledger)))
}

/// Run `depo ledger record`: hash the input and output and append a row.
pub fn record(project_dir: &Path, config: &DocumentConfig, args: &RecordArgs) -> Result<AuditRecord> {
    let ledger = ledger_at(project_dir, config, args.ledger.as_ref());
    let input = project_dir.join(&args.input);
    let output = project_dir.join(&args.output);

    let mut record = AuditRecord::capture(&args.figure_id, &args.script, &input, &output)
        .with_context(|| format!("hashing artifacts for {}", args.figure_id))?;
    if let Some(date) = &args.date {
        record.execution_date = parse_date(date)
            .ok_or_else(|| ConfigError(format!("unparsable --date '{date}' (use YYYY-MM-DD or RFC 3339)")))?;
    }
    if let Some(v) = &args.environment_version {
        record.environment_version = v.clone();
    }
    if let Some(v) = &args.dependency_versions {
        record.dependency_versions = v.clone();
    }

    ledger.append(&record)?;
    println!(
        "Recorded {} ({} → {}) in {}",
        record.figure_id,
        record.script_path,
        short(record.output_hash.as_str()),
        ledger.path().display()
    );
    Ok(record)
}

/// Run `depo ledger show [<figure_id>] [--all]`.
pub fn show(
    project_dir: &Path,
    config: &DocumentConfig,
    figure_id: Option<&str>,
    all: bool,
    ledger: Option<&PathBuf>,
) -> Result<()> {
    let ledger = ledger_at(project_dir, config, ledger);
    let records: Vec<AuditRecord> = if all {
        ledger.read()?
    } else {
        ledger.latest()?.into_values().collect()
    };
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| figure_id.map_or(true, |id| r.figure_id == id))
        .collect();

    if records.is_empty() {
        println!("No audit records in {}", ledger.path().display());
        return Ok(());
    }
    print!("{}", format_records(&records));
    Ok(())
}

pub fn format_records(records: &[AuditRecord]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format!(
            "{:<8} {}  {}  out {}  in {}",
            r.figure_id,
            format_date(&r.execution_date),
            r.script_path,
            short(r.output_hash.as_str()),
            short(r.input_hash.as_str())
        ));
        if !r.environment_version.is_empty() {
            out.push_str(&format!("  [{}]", r.environment_version));
        }
        out.push('\n');
    }
    out
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
