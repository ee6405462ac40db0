//! Rendering the provenance document.
//!
//! Inputs are the template, the ledger, and a scan of the repository. The
//! output depends on nothing else (no wall-clock time, no walk order), so an
//! unchanged tree renders byte-identical output and can be diffed against the
//! committed document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use depo_core::write_atomic;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crossref::{cross_reference, CrossReference, Entry, EntryStatus};
use crate::error::{ProvenanceError, Result};
use crate::ledger::{format_date, AuditLedger};
use crate::scanner::{scan, ArtifactKind, ScanOptions};
use crate::template::{Marker, Template};

pub const DEFAULT_TABLE_DESCRIPTION: &str = "Processed analysis table.";

/// Knobs for one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    pub scan: ScanOptions,
    /// File-name substring → table description. The longest matching key wins.
    pub descriptions: BTreeMap<String, String>,
    pub default_description: String,
    /// Fixed timestamp text; defaults to the newest ledger execution date.
    pub timestamp: Option<String>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            scan: ScanOptions::default(),
            descriptions: BTreeMap::new(),
            default_description: DEFAULT_TABLE_DESCRIPTION.into(),
            timestamp: None,
        }
    }
}

impl DocumentOptions {
    pub fn describe_table(&self, file_name: &str) -> &str {
        self.descriptions
            .iter()
            .filter(|(key, _)| file_name.contains(key.as_str()))
            .fold(None::<(&String, &String)>, |best, (k, v)| match best {
                Some((bk, _)) if bk.len() >= k.len() => best,
                _ => Some((k, v)),
            })
            .map(|(_, v)| v.as_str())
            .unwrap_or(&self.default_description)
    }
}

/// A rendered document plus the cross-reference it was built from.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub document: String,
    pub timestamp: String,
    pub xref: CrossReference,
}

/// Scan `root`, read `ledger`, and fill `template`.
pub fn synthesize(
    root: &Path,
    ledger: &AuditLedger,
    template: &Template,
    options: &DocumentOptions,
) -> Result<Rendered> {
    let records = ledger.read()?;
    let timestamp = match &options.timestamp {
        Some(ts) => ts.clone(),
        None => records
            .iter()
            .map(|r| r.execution_date)
            .max()
            .map(|d| format_date(&d))
            .unwrap_or_else(|| "no audit records yet".to_string()),
    };
    let latest = crate::ledger::latest_by_figure(records);
    let mut artifacts = scan(root, &options.scan)?;
    if let Some(own) = relative_to(root, ledger.path()) {
        artifacts.retain(|a| a.path != own);
    }
    let xref = cross_reference(root, &artifacts, &latest)?;

    let document = template.render(|marker| {
        Some(match marker {
            Marker::Tables => section(
                xref.of_kind(ArtifactKind::Table),
                |e| table_line(e, options),
                "*No processed data files found.*",
            ),
            Marker::Scripts => section(
                xref.of_kind(ArtifactKind::Script),
                plain_line,
                "*No analysis scripts found.*",
            ),
            Marker::Figures => section(
                xref.of_kind(ArtifactKind::Figure),
                plain_line,
                "*No figure files found.*",
            ),
            Marker::Timestamp => timestamp.clone(),
            Marker::Caveats => caveats(&xref),
        })
    });

    info!(
        "rendered {} artifact(s): {} stale, {} unverified, {} undocumented, {} missing",
        xref.entries.len(),
        xref.stale.len(),
        xref.unverified().count(),
        xref.undocumented().count(),
        xref.missing.len()
    );
    Ok(Rendered {
        document,
        timestamp,
        xref,
    })
}

/// `path` relative to `root`, when it lives under it. The ledger is itself a
/// `.tsv` and must not be reported as a table.
fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = std::fs::canonicalize(root).ok()?;
    let path = std::fs::canonicalize(path).ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

fn section<'a>(
    entries: impl Iterator<Item = &'a Entry>,
    line: impl Fn(&Entry) -> String,
    empty: &str,
) -> String {
    let lines: Vec<String> = entries.map(line).collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

fn table_line(entry: &Entry, options: &DocumentOptions) -> String {
    let name = entry
        .artifact
        .path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    format!(
        "- `{}` – {}{}",
        entry.artifact.display_path(),
        options.describe_table(&name),
        annotation(entry)
    )
}

fn plain_line(entry: &Entry) -> String {
    format!("- `{}`{}", entry.artifact.display_path(), annotation(entry))
}

fn annotation(entry: &Entry) -> String {
    let id = entry.figure_id.as_deref().unwrap_or("?");
    let date = entry
        .record
        .as_ref()
        .map(|r| r.execution_date.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    match entry.status {
        EntryStatus::Verified => format!(" _({id}, verified {date})_"),
        EntryStatus::Recorded => format!(" _({id}, recorded {date})_"),
        EntryStatus::Stale => {
            format!(" **({id}, stale: output differs from the audit record of {date})**")
        }
        EntryStatus::Unverified => {
            format!(" _({id}, unverified: audit hash recorded for another artifact)_")
        }
        EntryStatus::Undocumented => " _(undocumented)_".to_string(),
        EntryStatus::Untracked => String::new(),
    }
}

fn caveats(xref: &CrossReference) -> String {
    let mut lines = Vec::new();
    for id in &xref.stale {
        lines.push(format!(
            "- `{id}`: output artifacts no longer match the audit ledger (stale)."
        ));
    }
    for entry in xref.unverified() {
        lines.push(format!(
            "- `{}`: the `{}` audit hash covers another artifact, this file is unverified.",
            entry.artifact.display_path(),
            entry.figure_id.as_deref().unwrap_or("?")
        ));
    }
    for entry in xref.undocumented() {
        lines.push(format!(
            "- `{}` has no audit record (undocumented).",
            entry.artifact.display_path()
        ));
    }
    for record in &xref.missing {
        lines.push(format!(
            "- `{}`: audit record from `{}` has no matching table or figure (missing artifact).",
            record.figure_id, record.script_path
        ));
    }
    if lines.is_empty() {
        "*No provenance caveats.*".to_string()
    } else {
        lines.join("\n")
    }
}

/// Write the rendered document atomically.
pub fn write_document(path: &Path, document: &str) -> Result<()> {
    write_atomic(path, document.as_bytes())?;
    Ok(())
}

/// Whether the committed document at `path` already equals `document`.
pub fn is_up_to_date(path: &Path, document: &str) -> Result<bool> {
    match std::fs::read(path) {
        Ok(existing) => Ok(existing == document.as_bytes()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ProvenanceError::Io {
            path: PathBuf::from(path),
            source,
        }),
    }
}
