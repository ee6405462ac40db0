//! Shared building blocks for the depo deposition and provenance pipeline.
//!
//! - [`ContentHash`]: SHA-256 content addressing for release assets and
//!   audited artifacts.
//! - [`Environment`]: the two deposit service targets (sandbox, production).
//! - [`write_atomic`]: temp-file-plus-rename writes so a half-written file is
//!   never observed under its final name.

pub mod atomic;
pub mod environment;
pub mod error;
pub mod integrity;

pub use atomic::{persist_atomic, write_atomic};
pub use environment::Environment;
pub use error::{CoreError, Result};
pub use integrity::ContentHash;
