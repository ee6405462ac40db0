//! Deposition metadata manifest.
//!
//! The manifest describes the archived work: title, description, authors,
//! keywords, license, and related identifiers. It is read from JSON
//! (`.zenodo.json`) or TOML (any `*.toml` path) and validated before any
//! network call is made.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DepositError, Result};

/// Metadata describing a deposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataManifest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Author list; `creators` is accepted for compatibility with `.zenodo.json`.
    #[serde(default, alias = "creators")]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub related_identifiers: Vec<RelatedIdentifier>,
    /// Deposit type understood by the service (`software`, `dataset`, ...).
    #[serde(default = "default_upload_type")]
    pub upload_type: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_access_right")]
    pub access_right: String,
}

/// A creator of the deposited work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    /// Persistent author identifier, typically an ORCID.
    #[serde(default, alias = "orcid")]
    pub identifier: Option<String>,
}

/// A link from the deposition to another persistent identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedIdentifier {
    pub identifier: String,
    /// Relation type, e.g. `isSupplementTo`.
    pub relation: String,
}

fn default_upload_type() -> String {
    "software".to_string()
}

fn default_access_right() -> String {
    "open".to_string()
}

impl MetadataManifest {
    /// Load and validate a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DepositError::Manifest {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let manifest = if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_json(&content)
        }
        .map_err(|e| match e {
            DepositError::InvalidMetadata { .. } => e,
            other => DepositError::Manifest {
                path: path.to_path_buf(),
                detail: other.to_string(),
            },
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from JSON without validating required fields.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a manifest from TOML without validating required fields.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DepositError::InvalidMetadata {
            detail: format!("TOML parse error: {e}"),
        })
    }

    /// Check that the fields the deposit service requires are present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.authors.is_empty() {
            missing.push("authors");
        }
        if !missing.is_empty() {
            return Err(DepositError::InvalidMetadata {
                detail: format!("missing required field(s): {}", missing.join(", ")),
            });
        }
        if let Some(author) = self.authors.iter().find(|a| a.name.trim().is_empty()) {
            return Err(DepositError::InvalidMetadata {
                detail: format!("author with empty name (affiliation {:?})", author.affiliation),
            });
        }
        Ok(())
    }

    /// Render the manifest in the deposit API's metadata shape.
    pub fn to_deposit_metadata(&self) -> Value {
        let creators: Vec<Value> = self
            .authors
            .iter()
            .map(|a| {
                let mut creator = json!({ "name": a.name });
                if let Some(aff) = &a.affiliation {
                    creator["affiliation"] = json!(aff);
                }
                if let Some(id) = &a.identifier {
                    creator["orcid"] = json!(id);
                }
                creator
            })
            .collect();

        let related: Vec<Value> = self
            .related_identifiers
            .iter()
            .map(|r| json!({ "identifier": r.identifier, "relation": r.relation }))
            .collect();

        let mut metadata = json!({
            "title": self.title,
            "description": self.description,
            "upload_type": self.upload_type,
            "access_right": self.access_right,
            "creators": creators,
        });
        if !self.keywords.is_empty() {
            metadata["keywords"] = json!(self.keywords);
        }
        if let Some(license) = &self.license {
            metadata["license"] = json!(license);
        }
        if !related.is_empty() {
            metadata["related_identifiers"] = json!(related);
        }
        if let Some(version) = &self.version {
            metadata["version"] = json!(version);
        }
        metadata
    }
}
