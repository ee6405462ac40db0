//! Deposit service environments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which deposit service instance a deployment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Testing instance; records and DOIs are not permanent.
    Sandbox,
    /// The real archive.
    Production,
}

impl Environment {
    /// Base URL of the deposit REST API.
    pub fn api_base(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox.zenodo.org/api",
            Environment::Production => "https://zenodo.org/api",
        }
    }

    /// Base URL for public record pages.
    pub fn records_base(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox.zenodo.org/records",
            Environment::Production => "https://zenodo.org/records",
        }
    }

    /// DOI prefix minted by this environment.
    pub fn doi_prefix(self) -> &'static str {
        match self {
            Environment::Sandbox => "10.5072",
            Environment::Production => "10.5281",
        }
    }

    /// The DOI this environment assigns to a record.
    pub fn doi_for(self, record_id: u64) -> String {
        format!("{}/zenodo.{record_id}", self.doi_prefix())
    }

    /// The public URL of a record.
    pub fn record_url(self, record_id: u64) -> String {
        format!("{}/{record_id}", self.records_base())
    }

    /// Whether `doi` has the `{prefix}/zenodo.{record_id}` shape for this environment.
    pub fn doi_matches(self, doi: &str, record_id: u64) -> bool {
        doi == self.doi_for(record_id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(CoreError::UnknownEnvironment(other.to_string())),
        }
    }
}
