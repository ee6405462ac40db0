//! GitHub releases API implementation of [`ReleaseSource`].

use std::io::{self, Write};
use std::time::Duration;

use depo_core::ContentHash;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{DepositError, Result};
use crate::http::{check_status, http_client, transfer_timeout};
use crate::release::{Asset, Release, ReleaseSource};

const GITHUB_API: &str = "https://api.github.com";

/// Reads releases from the GitHub REST API.
pub struct GitHubSource {
    client: Client,
    timeout: Duration,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: String,
    #[serde(default)]
    assets: Vec<AssetPayload>,
}

#[derive(Debug, Deserialize)]
struct AssetPayload {
    name: String,
    browser_download_url: String,
    size: u64,
    #[serde(default)]
    digest: Option<String>,
}

impl GitHubSource {
    /// Create a source; `token` is only needed for private repositories.
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(GitHubSource {
            client: http_client(timeout)?,
            timeout,
            api_base: GITHUB_API.to_string(),
            token,
        })
    }

    /// Point the source at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn convert(owner: &str, repo: &str, payload: ReleasePayload) -> Release {
        let assets = payload
            .assets
            .into_iter()
            .map(|a| {
                let content_hash = a.digest.as_deref().and_then(|d| match ContentHash::parse(d) {
                    Ok(hash) => Some(hash),
                    Err(e) => {
                        warn!("ignoring unusable digest for asset '{}': {e}", a.name);
                        None
                    }
                });
                Asset {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size_bytes: a.size,
                    content_hash,
                }
            })
            .collect();
        Release {
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: payload.tag_name,
            assets,
        }
    }
}

impl ReleaseSource for GitHubSource {
    fn release(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_base);
        let context = format!("release lookup for {owner}/{repo}@{tag}");
        debug!("GET {url}");

        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| DepositError::from_http(&context, e))?;
        let response = check_status(response, &context, &format!("release {owner}/{repo}@{tag}"))?;
        let payload: ReleasePayload = response
            .json()
            .map_err(|e| DepositError::UnexpectedResponse {
                context,
                detail: e.to_string(),
            })?;

        if payload.tag_name != tag {
            return Err(DepositError::NotFound {
                what: format!(
                    "release {owner}/{repo}@{tag} (host returned tag '{}')",
                    payload.tag_name
                ),
            });
        }
        Ok(Self::convert(owner, repo, payload))
    }

    fn fetch(&self, asset: &Asset, sink: &mut dyn Write) -> Result<u64> {
        let context = format!("download of '{}'", asset.name);
        let response = self
            .authorize(self.client.get(&asset.download_url))
            .header("Accept", "application/octet-stream")
            .timeout(transfer_timeout(self.timeout, asset.size_bytes))
            .send()
            .map_err(|e| DepositError::from_http(&context, e))?;
        let mut response = check_status(response, &context, &format!("asset '{}'", asset.name))?;

        io::copy(&mut response, sink).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                DepositError::NetworkTimeout { context }
            } else {
                DepositError::Network {
                    context,
                    detail: e.to_string(),
                }
            }
        })
    }
}
