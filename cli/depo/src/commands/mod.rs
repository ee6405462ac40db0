//! CLI command implementations.

pub mod deploy;
pub mod document;
pub mod ledger;
pub mod status;

/// A missing or contradictory setting in flags or `depo.toml`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);
