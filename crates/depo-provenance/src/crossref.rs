//! Matching scanned artifacts against the audit ledger.
//!
//! Each live table or figure is hashed on its own. It is *verified* only when
//! its bytes equal the recorded `output_hash`. A record has one output hash, so
//! when another artifact of the same figure matches, the rest are *unverified*.
//! When none match, the record and all its artifacts are *stale*.
//! Artifacts without a record are *undocumented*; records without any live
//! table or figure are *missing artifacts*. None of these is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use depo_core::ContentHash;

use crate::error::Result;
use crate::ledger::AuditRecord;
use crate::scanner::{ArtifactKind, ScannedArtifact};

/// Provenance status of one rendered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Output hash matches the ledger.
    Verified,
    /// Output hash differs from the ledger: the artifact drifted.
    Stale,
    /// The record's output hash belongs to another artifact of the same figure.
    Unverified,
    /// A script with a ledger row whose outputs are not present to verify.
    Recorded,
    /// Carries a figure id (or is a table) but no ledger row exists.
    Undocumented,
    /// A helper script with no figure id and no ledger reference.
    Untracked,
}

/// A scanned artifact with its ledger match.
#[derive(Debug, Clone)]
pub struct Entry {
    pub artifact: ScannedArtifact,
    /// Figure id used for ordering; from the file name or, for scripts, the
    /// record naming this script.
    pub figure_id: Option<String>,
    pub record: Option<AuditRecord>,
    pub status: EntryStatus,
}

impl Entry {
    /// Sort key: by figure id (entries without one last), then path.
    fn sort_key(&self) -> (bool, Option<&str>, &Path) {
        (
            self.figure_id.is_none(),
            self.figure_id.as_deref(),
            self.artifact.path.as_path(),
        )
    }
}

/// The result of cross-referencing one scan against one ledger.
#[derive(Debug, Clone, Default)]
pub struct CrossReference {
    /// Every artifact, sorted by (figure id, path).
    pub entries: Vec<Entry>,
    /// Records matching no live table or figure.
    pub missing: Vec<AuditRecord>,
    /// Figure ids whose record no longer matches the live artifacts.
    pub stale: Vec<String>,
}

impl CrossReference {
    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(move |e| e.artifact.kind == kind)
    }

    pub fn undocumented(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Undocumented)
    }

    pub fn unverified(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Unverified)
    }

    /// Whether any caveat was found.
    pub fn has_caveats(&self) -> bool {
        !self.missing.is_empty()
            || !self.stale.is_empty()
            || self.undocumented().next().is_some()
            || self.unverified().next().is_some()
    }
}

/// Cross-reference `artifacts` (relative to `root`) with the winning ledger rows.
///
/// Output artifacts of every matched record are re-hashed from disk.
pub fn cross_reference(
    root: &Path,
    artifacts: &[ScannedArtifact],
    latest: &BTreeMap<String, AuditRecord>,
) -> Result<CrossReference> {
    let mut outputs: BTreeMap<&str, Vec<&ScannedArtifact>> = BTreeMap::new();
    for artifact in artifacts {
        if artifact.kind == ArtifactKind::Script {
            continue;
        }
        if let Some(id) = artifact.figure_id.as_deref() {
            outputs.entry(id).or_default().push(artifact);
        }
    }

    let mut verified: BTreeMap<&str, bool> = BTreeMap::new();
    let mut matches: BTreeSet<&Path> = BTreeSet::new();
    let mut missing = Vec::new();
    for (id, record) in latest {
        let Some(live) = outputs.get(id.as_str()) else {
            missing.push(record.clone());
            continue;
        };
        for artifact in live {
            if ContentHash::compute_file(&root.join(&artifact.path))? == record.output_hash {
                matches.insert(artifact.path.as_path());
            }
        }
        let ok = live.iter().any(|a| matches.contains(a.path.as_path()));
        if !ok {
            tracing::warn!(
                "{id}: output hash {} recorded on {} matches no live artifact",
                record.output_hash,
                crate::ledger::format_date(&record.execution_date)
            );
        }
        verified.insert(id.as_str(), ok);
    }

    let mut entries = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let record = match artifact.kind {
            ArtifactKind::Script => script_record(artifact, latest),
            _ => artifact.figure_id.as_ref().and_then(|id| latest.get(id)),
        };
        let status = match record {
            Some(r) => match verified.get(r.figure_id.as_str()).copied() {
                None => EntryStatus::Recorded,
                Some(false) => EntryStatus::Stale,
                Some(true) if artifact.kind == ArtifactKind::Script => EntryStatus::Verified,
                Some(true) if matches.contains(artifact.path.as_path()) => EntryStatus::Verified,
                Some(true) => EntryStatus::Unverified,
            },
            None if artifact.kind == ArtifactKind::Script && artifact.figure_id.is_none() => {
                EntryStatus::Untracked
            }
            None => EntryStatus::Undocumented,
        };
        entries.push(Entry {
            artifact: artifact.clone(),
            figure_id: record
                .map(|r| r.figure_id.clone())
                .or_else(|| artifact.figure_id.clone()),
            record: record.cloned(),
            status,
        });
    }
    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let stale: BTreeSet<String> = verified
        .iter()
        .filter(|(_, ok)| !**ok)
        .map(|(id, _)| id.to_string())
        .collect();

    Ok(CrossReference {
        entries,
        missing,
        stale: stale.into_iter().collect(),
    })
}

/// The record naming this script as its producer, else the one matching its figure id.
fn script_record<'a>(
    artifact: &ScannedArtifact,
    latest: &'a BTreeMap<String, AuditRecord>,
) -> Option<&'a AuditRecord> {
    let path = artifact.display_path();
    latest
        .values()
        .find(|r| r.script_path.trim_start_matches("./") == path)
        .or_else(|| artifact.figure_id.as_ref().and_then(|id| latest.get(id)))
}
