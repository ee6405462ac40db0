//! The audit ledger: an append-only, tab-delimited provenance table.
//!
//! ```text
//! figure_id  script_path  input_hash  output_hash  execution_date  environment_version  dependency_versions
//! ```
//!
//! One record per physical line, header mandatory. Rows are never rewritten;
//! a correction is a new row for the same `figure_id` with a later
//! `execution_date`, and the latest row wins.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use depo_core::ContentHash;

use crate::error::{ProvenanceError, Result};

/// Column names, in file order.
pub const COLUMNS: [&str; 7] = [
    "figure_id",
    "script_path",
    "input_hash",
    "output_hash",
    "execution_date",
    "environment_version",
    "dependency_versions",
];

/// One provenance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub figure_id: String,
    /// Producing script, relative to the repository root.
    pub script_path: String,
    pub input_hash: ContentHash,
    pub output_hash: ContentHash,
    pub execution_date: DateTime<Utc>,
    /// Interpreter or toolchain version, e.g. `python 3.11.6`.
    pub environment_version: String,
    /// Free-form pinned dependency list, e.g. `numpy==1.26.4;pandas==2.2.1`.
    pub dependency_versions: String,
}

impl AuditRecord {
    /// Build a record by hashing an input and an output file now.
    pub fn capture(figure_id: &str, script_path: &str, input: &Path, output: &Path) -> Result<Self> {
        Ok(AuditRecord {
            figure_id: figure_id.to_string(),
            script_path: script_path.to_string(),
            input_hash: ContentHash::compute_file(input)?,
            output_hash: ContentHash::compute_file(output)?,
            execution_date: Utc::now(),
            environment_version: String::new(),
            dependency_versions: String::new(),
        })
    }

    fn fields(&self) -> [String; 7] {
        [
            self.figure_id.clone(),
            self.script_path.clone(),
            self.input_hash.to_string(),
            self.output_hash.to_string(),
            format_date(&self.execution_date),
            self.environment_version.clone(),
            self.dependency_versions.clone(),
        ]
    }

    fn to_row(&self) -> Result<String> {
        if self.figure_id.trim().is_empty() {
            return Err(ProvenanceError::InvalidRecord {
                figure_id: self.figure_id.clone(),
                detail: "figure_id is empty".into(),
            });
        }
        let fields = self.fields();
        for (name, value) in COLUMNS.iter().zip(&fields) {
            if value.contains(['\t', '\n', '\r']) {
                return Err(ProvenanceError::InvalidRecord {
                    figure_id: self.figure_id.clone(),
                    detail: format!("{name} contains a tab or line break"),
                });
            }
        }
        Ok(fields.join("\t"))
    }
}

/// Render a date the way the ledger stores it.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accept RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A ledger file on disk.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    path: PathBuf,
}

impl AuditLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLedger { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows in file order. A missing ledger has no rows.
    pub fn read(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(ProvenanceError::io(&self.path))?;
        parse(&content, &self.path)
    }

    /// The winning row per figure_id: latest `execution_date`, later row on ties.
    pub fn latest(&self) -> Result<BTreeMap<String, AuditRecord>> {
        Ok(latest_by_figure(self.read()?))
    }

    /// Append one row, writing the header first if the ledger is new.
    ///
    /// The existing content is parsed first so a row is never appended to a
    /// ledger that would no longer read back.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let row = record.to_row()?;
        let existing = if self.path.is_file() {
            std::fs::read_to_string(&self.path).map_err(ProvenanceError::io(&self.path))?
        } else {
            String::new()
        };
        if !existing.trim().is_empty() {
            parse(&existing, &self.path)?;
        }

        let mut out = String::new();
        if existing.trim().is_empty() {
            out.push_str(&COLUMNS.join("\t"));
            out.push('\n');
        } else if !existing.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&row);
        out.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ProvenanceError::io(parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(ProvenanceError::io(&self.path))?;
        if existing.trim().is_empty() {
            file.set_len(0).map_err(ProvenanceError::io(&self.path))?;
        }
        file.write_all(out.as_bytes())
            .map_err(ProvenanceError::io(&self.path))?;
        tracing::debug!("appended audit record for {} to {}", record.figure_id, self.path.display());
        Ok(())
    }
}

/// Parse ledger text. `path` is only used in error messages.
pub fn parse(content: &str, path: &Path) -> Result<Vec<AuditRecord>> {
    let err = |line: usize, detail: String| ProvenanceError::Ledger {
        path: path.to_path_buf(),
        line,
        detail,
    };

    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((header_line, header)) = lines.next() else {
        return Err(err(1, "missing header row".into()));
    };
    let names: Vec<&str> = header.split('\t').map(str::trim).collect();
    if names != COLUMNS {
        return Err(err(
            header_line,
            format!("expected header '{}', found '{}'", COLUMNS.join("\\t"), header),
        ));
    }

    let mut records = Vec::new();
    for (line, text) in lines {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() != COLUMNS.len() {
            return Err(err(
                line,
                format!("expected {} columns, found {}", COLUMNS.len(), fields.len()),
            ));
        }
        let hash = |i: usize| {
            ContentHash::parse(fields[i]).map_err(|e| err(line, format!("{}: {e}", COLUMNS[i])))
        };
        let execution_date = parse_date(fields[4].trim())
            .ok_or_else(|| err(line, format!("unparsable execution_date '{}'", fields[4])))?;
        let figure_id = fields[0].trim();
        if figure_id.is_empty() {
            return Err(err(line, "figure_id is empty".into()));
        }
        records.push(AuditRecord {
            figure_id: figure_id.to_string(),
            script_path: fields[1].trim().to_string(),
            input_hash: hash(2)?,
            output_hash: hash(3)?,
            execution_date,
            environment_version: fields[5].trim().to_string(),
            dependency_versions: fields[6].trim().to_string(),
        });
    }
    Ok(records)
}

/// Reduce rows to the winning record per figure_id.
pub fn latest_by_figure(records: Vec<AuditRecord>) -> BTreeMap<String, AuditRecord> {
    let mut latest: BTreeMap<String, AuditRecord> = BTreeMap::new();
    for record in records {
        let replace = latest
            .get(&record.figure_id)
            .map_or(true, |current| record.execution_date >= current.execution_date);
        if replace {
            latest.insert(record.figure_id.clone(), record);
        }
    }
    latest
}
