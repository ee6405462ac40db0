//! Repository walk classifying files as tables, figures, or analysis scripts.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::{ProvenanceError, Result};

/// What a scanned file is, by naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Table,
    Figure,
    Script,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Table => write!(f, "table"),
            ArtifactKind::Figure => write!(f, "figure"),
            ArtifactKind::Script => write!(f, "script"),
        }
    }
}

/// A classified file, relative to the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Figure id derived from the file name, e.g. `Fig1` for `Fig1_Separation.tsv`.
    pub figure_id: Option<String>,
}

impl ScannedArtifact {
    /// Path with forward slashes, as rendered in documents.
    pub fn display_path(&self) -> String {
        display_path(&self.path)
    }
}

pub(crate) fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Naming conventions used to classify files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub figure_prefixes: Vec<String>,
    pub table_extensions: Vec<String>,
    pub figure_extensions: Vec<String>,
    pub script_extensions: Vec<String>,
    /// Directory names or root-relative paths to skip.
    pub exclude: Vec<String>,
    /// Tables under a directory with this name are not reported.
    pub metadata_dir: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        ScanOptions {
            figure_prefixes: owned(&["Fig", "ED"]),
            table_extensions: owned(&["tsv", "csv"]),
            figure_extensions: owned(&["pdf", "png", "svg"]),
            script_extensions: owned(&["py", "R", "r", "jl", "sh", "ipynb"]),
            exclude: owned(&["target", "node_modules"]),
            metadata_dir: "metadata".into(),
        }
    }
}

impl ScanOptions {
    /// Classify a root-relative path, or `None` if it is not an artifact.
    pub fn classify(&self, rel: &Path) -> Option<ArtifactKind> {
        let ext = rel.extension()?.to_str()?;
        let name = rel.file_name()?.to_str()?;
        let has = |exts: &[String]| exts.iter().any(|e| e == ext);

        if has(&self.table_extensions) {
            let in_metadata = rel
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|d| d == self.metadata_dir.as_str());
            return (!in_metadata).then_some(ArtifactKind::Table);
        }
        if has(&self.figure_extensions) {
            let is_figure = self.figure_prefixes.iter().any(|p| name.starts_with(p.as_str()));
            return is_figure.then_some(ArtifactKind::Figure);
        }
        if has(&self.script_extensions) {
            return Some(ArtifactKind::Script);
        }
        None
    }

    /// Candidate figure id: the first `_`/`.`-delimited token of the file
    /// name when it is a known prefix followed by a digit.
    pub fn figure_id(&self, file_name: &str) -> Option<String> {
        let token = file_name.split(['_', '.']).next()?;
        self.figure_prefixes
            .iter()
            .filter_map(|p| token.strip_prefix(p.as_str()))
            .any(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .then(|| token.to_string())
    }

    fn is_excluded(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return true;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(display_path)
            .unwrap_or_default();
        self.exclude.iter().any(|x| *x == name || *x == rel)
    }
}

/// Walk `root` and return every artifact, sorted by path.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<Vec<ScannedArtifact>> {
    if !root.is_dir() {
        return Err(ProvenanceError::Scan {
            path: root.to_path_buf(),
            detail: "not a directory".into(),
        });
    }

    let mut artifacts = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !options.is_excluded(root, e));
    for entry in walker {
        let entry = entry.map_err(|e| ProvenanceError::Scan {
            path: e.path().unwrap_or(root).to_path_buf(),
            detail: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(kind) = options.classify(rel) else {
            continue;
        };
        let figure_id = rel
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| options.figure_id(n));
        artifacts.push(ScannedArtifact {
            path: rel.to_path_buf(),
            kind,
            figure_id,
        });
    }

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("scanned {} artifact(s) under {}", artifacts.len(), root.display());
    Ok(artifacts)
}
