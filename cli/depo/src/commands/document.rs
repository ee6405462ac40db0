//! `depo document`: render the provenance document from the ledger and scan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depo_provenance::{
    is_up_to_date, synthesize, write_document, ArtifactKind, AuditLedger, Rendered, Template,
};

use crate::config::DocumentConfig;

/// Flags of `depo document`; unset values fall back to `[document]`.
#[derive(Debug, Clone, Default)]
pub struct DocumentArgs {
    pub root: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub timestamp: Option<String>,
    /// Compare with the existing output instead of writing it.
    pub check: bool,
}

/// The committed document differs from a fresh render.
#[derive(Debug, thiserror::Error)]
#[error("{} is out of date; run `depo document` to regenerate it", path.display())]
pub struct DocumentDrift {
    pub path: PathBuf,
}

/// Run `depo document`.
pub fn run(project_dir: &Path, config: &DocumentConfig, args: &DocumentArgs) -> Result<Rendered> {
    let pick = |flag: &Option<PathBuf>, default: &PathBuf| {
        project_dir.join(flag.as_ref().unwrap_or(default))
    };
    let root = pick(&args.root, &config.root);
    let template_path = pick(&args.template, &config.template);
    let output = pick(&args.output, &config.output);
    let ledger = AuditLedger::new(pick(&args.ledger, &config.ledger));

    let template = Template::load(&template_path)
        .with_context(|| format!("loading template {}", template_path.display()))?;
    if template.markers().is_empty() {
        tracing::warn!("{} has no insertion markers", template_path.display());
    }
    let options = config.options(args.timestamp.clone());
    let rendered = synthesize(&root, &ledger, &template, &options)?;

    if args.check {
        if !is_up_to_date(&output, &rendered.document)? {
            return Err(DocumentDrift { path: output }.into());
        }
        println!("{} is up to date", output.display());
    } else {
        write_document(&output, &rendered.document)?;
        println!("Wrote {}", output.display());
    }
    print!("{}", format_summary(&rendered));
    Ok(rendered)
}

fn format_summary(rendered: &Rendered) -> String {
    let xref = &rendered.xref;
    let count = |kind| xref.of_kind(kind).count();
    let mut out = format!(
        "  {} tables, {} figures, {} scripts (audited through {})\n",
        count(ArtifactKind::Table),
        count(ArtifactKind::Figure),
        count(ArtifactKind::Script),
        rendered.timestamp
    );
    for id in &xref.stale {
        out.push_str(&format!("  ! {id}: stale (artifact changed since its audit record)\n"));
    }
    for entry in xref.unverified() {
        out.push_str(&format!(
            "  ! {}: unverified (audit hash covers another artifact)\n",
            entry.artifact.display_path()
        ));
    }
    for entry in xref.undocumented() {
        out.push_str(&format!("  ! {}: undocumented\n", entry.artifact.display_path()));
    }
    for record in &xref.missing {
        out.push_str(&format!("  ! {}: missing artifact\n", record.figure_id));
    }
    out
}
