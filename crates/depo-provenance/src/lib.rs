//! Provenance tracking for published figures and tables.
//!
//! - **Ledger** ([`AuditLedger`]): append-only TSV linking each figure id to
//!   its producing script and the hashes of its input and output.
//! - **Scanner** ([`scan`]): classifies repository files as tables, figures,
//!   or analysis scripts by naming convention.
//! - **Cross-reference** ([`cross_reference`]): re-hashes live artifacts and
//!   flags stale, undocumented, and missing entries.
//! - **Synthesizer** ([`synthesize`]): renders the result into a template's
//!   insertion points, deterministically.

pub mod crossref;
pub mod error;
pub mod ledger;
pub mod scanner;
pub mod synthesize;
pub mod template;

// Re-exports for convenience.
pub use crossref::{cross_reference, CrossReference, Entry, EntryStatus};
pub use error::{ProvenanceError, Result};
pub use ledger::{AuditLedger, AuditRecord, COLUMNS};
pub use scanner::{scan, ArtifactKind, ScanOptions, ScannedArtifact};
pub use synthesize::{
    is_up_to_date, synthesize, write_document, DocumentOptions, Rendered,
    DEFAULT_TABLE_DESCRIPTION,
};
pub use template::{Marker, Template};
