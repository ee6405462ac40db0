//! Zenodo REST API implementation of [`DepositionService`].
//!
//! Endpoints used:
//! - `POST   {api}/deposit/depositions`: create a draft
//! - `GET    {api}/deposit/depositions/{id}`: state, links, files
//! - `PUT    {api}/deposit/depositions/{id}`: replace metadata
//! - `PUT    {bucket}/{filename}`: upload (overwrites same-named files)
//! - `POST   {api}/deposit/depositions/{id}/actions/publish`: mint the DOI

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use depo_core::Environment;
use reqwest::blocking::{Body, Client};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{
    check_file_size, AccessToken, Deposition, DepositionService, DepositionState,
    PublishedRecord, DEFAULT_MAX_FILE_BYTES, SCOPE_ACTIONS, SCOPE_WRITE,
};
use crate::error::{DepositError, Result};
use crate::http::{check_status, http_client, transfer_timeout};
use crate::manifest::MetadataManifest;
use crate::retry::RetryPolicy;

/// A deposit client for one Zenodo environment.
pub struct ZenodoClient {
    client: Client,
    timeout: Duration,
    environment: Environment,
    api_base: String,
    token: AccessToken,
    max_file_bytes: u64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct DepositionPayload {
    id: u64,
    #[serde(default)]
    record_id: Option<u64>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    submitted: bool,
    #[serde(default)]
    links: LinksPayload,
    #[serde(default)]
    files: Vec<FilePayload>,
    #[serde(default)]
    metadata: Option<MetadataPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct LinksPayload {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    record_html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    #[serde(alias = "key")]
    filename: String,
}

#[derive(Debug, Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    doi: Option<String>,
}

impl DepositionPayload {
    fn into_deposition(self, environment: Environment) -> Deposition {
        let published = self.submitted || self.state.as_deref() == Some("done");
        let state = if published {
            DepositionState::Published
        } else if self.files.is_empty() {
            DepositionState::Draft
        } else {
            DepositionState::FilesUploaded
        };
        let doi = if published {
            self.doi
                .filter(|d| !d.is_empty())
                .or_else(|| self.metadata.and_then(|m| m.doi).filter(|d| !d.is_empty()))
        } else {
            None
        };
        Deposition {
            id: self.id,
            environment,
            state,
            record_id: self.record_id,
            doi,
            url: if published { self.links.record_html } else { None },
            files: self.files.into_iter().map(|f| f.filename).collect(),
        }
    }
}

impl ZenodoClient {
    /// Create a client for `environment` authenticated with `token`.
    pub fn new(environment: Environment, token: AccessToken, timeout: Duration) -> Result<Self> {
        Ok(ZenodoClient {
            client: http_client(timeout)?,
            timeout,
            environment,
            api_base: environment.api_base().to_string(),
            token,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the API root (self-hosted instances, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-file upload limit.
    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Override the retry policy for idempotent calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn deposition_url(&self, id: u64) -> String {
        format!("{}/deposit/depositions/{id}", self.api_base)
    }

    fn fetch_payload(&self, id: u64) -> Result<DepositionPayload> {
        let context = format!("fetch of deposition {id}");
        self.retry.run(&context, || {
            let response = self
                .client
                .get(self.deposition_url(id))
                .bearer_auth(self.token.secret())
                .send()
                .map_err(|e| DepositError::from_http(&context, e))?;
            let response = check_status(response, &context, &format!("deposition {id}"))?;
            response
                .json::<DepositionPayload>()
                .map_err(|e| DepositError::UnexpectedResponse {
                    context: context.clone(),
                    detail: e.to_string(),
                })
        })
    }
}

impl DepositionService for ZenodoClient {
    fn environment(&self) -> Environment {
        self.environment
    }

    fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    fn check_scopes(&self) -> Result<()> {
        self.token.require(SCOPE_WRITE, "create depositions and upload files")?;
        self.token.require(SCOPE_ACTIONS, "publish depositions")
    }

    fn create(&self, metadata: &MetadataManifest) -> Result<u64> {
        self.token.require(SCOPE_WRITE, "create a deposition")?;
        metadata.validate()?;
        let context = "create deposition";
        // Not retried: a lost response would otherwise leave a duplicate draft.
        let response = self
            .client
            .post(format!("{}/deposit/depositions", self.api_base))
            .bearer_auth(self.token.secret())
            .json(&json!({ "metadata": metadata.to_deposit_metadata() }))
            .send()
            .map_err(|e| DepositError::from_http(context, e))?;
        let response = check_status(response, context, "deposit endpoint")?;
        let payload: DepositionPayload =
            response
                .json()
                .map_err(|e| DepositError::UnexpectedResponse {
                    context: context.to_string(),
                    detail: e.to_string(),
                })?;
        info!("deposition created: {} ({})", payload.id, self.environment);
        Ok(payload.id)
    }

    fn fetch(&self, deposition_id: u64) -> Result<Deposition> {
        Ok(self
            .fetch_payload(deposition_id)?
            .into_deposition(self.environment))
    }

    fn attach_metadata(&self, deposition_id: u64, metadata: &MetadataManifest) -> Result<()> {
        self.token.require(SCOPE_WRITE, "edit deposition metadata")?;
        metadata.validate()?;
        let context = format!("metadata update of deposition {deposition_id}");
        let body = json!({ "metadata": metadata.to_deposit_metadata() });
        self.retry.run(&context, || {
            let response = self
                .client
                .put(self.deposition_url(deposition_id))
                .bearer_auth(self.token.secret())
                .json(&body)
                .send()
                .map_err(|e| DepositError::from_http(&context, e))?;
            check_status(response, &context, &format!("deposition {deposition_id}"))?;
            Ok(())
        })
    }

    fn upload(&self, deposition_id: u64, local_path: &Path) -> Result<()> {
        self.token.require(SCOPE_WRITE, "upload files")?;
        let size = std::fs::metadata(local_path)
            .map_err(|e| DepositError::CacheError {
                path: local_path.to_path_buf(),
                detail: e.to_string(),
            })?
            .len();
        check_file_size(local_path, size, self.max_file_bytes)?;

        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DepositError::InvalidAsset {
                name: local_path.display().to_string(),
                detail: "path has no file name".to_string(),
            })?;

        let bucket = self
            .fetch_payload(deposition_id)?
            .links
            .bucket
            .ok_or_else(|| DepositError::UnexpectedResponse {
                context: format!("deposition {deposition_id}"),
                detail: "no bucket link; is the deposition still editable?".to_string(),
            })?;

        let context = format!("upload of '{filename}' to deposition {deposition_id}");
        self.retry.run(&context, || {
            let file = File::open(local_path)?;
            debug!("PUT {bucket}/{filename} ({size} bytes)");
            let response = self
                .client
                .put(format!("{bucket}/{filename}"))
                .bearer_auth(self.token.secret())
                .header("Content-Type", "application/octet-stream")
                .timeout(transfer_timeout(self.timeout, size))
                .body(Body::sized(file, size))
                .send()
                .map_err(|e| DepositError::from_http(&context, e))?;
            check_status(response, &context, &format!("bucket of deposition {deposition_id}"))?;
            Ok(())
        })?;
        info!("uploaded {filename}");
        Ok(())
    }

    fn publish(&self, deposition_id: u64) -> Result<PublishedRecord> {
        self.token.require(SCOPE_ACTIONS, "publish a deposition")?;

        let current = self.fetch(deposition_id)?;
        if let Some(record) = current.published_record() {
            info!(
                "deposition {deposition_id} already published as {}; nothing to do",
                record.doi
            );
            return Ok(record);
        }

        let context = format!("publish of deposition {deposition_id}");
        let payload = self.retry.run(&context, || {
            let response = self
                .client
                .post(format!("{}/actions/publish", self.deposition_url(deposition_id)))
                .bearer_auth(self.token.secret())
                .send()
                .map_err(|e| DepositError::from_http(&context, e))?;
            let response =
                check_status(response, &context, &format!("deposition {deposition_id}"))?;
            response
                .json::<DepositionPayload>()
                .map_err(|e| DepositError::UnexpectedResponse {
                    context: context.clone(),
                    detail: e.to_string(),
                })
        })?;

        let mut deposition = payload.into_deposition(self.environment);
        // A successful publish response is authoritative even if `submitted` lags.
        deposition.state = DepositionState::Published;
        let record = deposition
            .published_record()
            .ok_or_else(|| DepositError::UnexpectedResponse {
                context,
                detail: "publish response did not describe a record".to_string(),
            })?;
        info!("published: DOI {}", record.doi);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manifest, LocalServer};

    fn parse(body: &str) -> Deposition {
        serde_json::from_str::<DepositionPayload>(body)
            .unwrap()
            .into_deposition(Environment::Sandbox)
    }

    #[test]
    fn draft_without_files() {
        let dep = parse(r#"{"id": 42, "state": "unsubmitted", "submitted": false,
            "links": {"bucket": "https://sandbox.zenodo.org/api/files/abc"},
            "metadata": {"prereserve_doi": {"doi": "10.5072/zenodo.42"}}}"#);
        assert_eq!(dep.state, DepositionState::Draft);
        assert!(dep.doi.is_none());
        assert!(dep.published_record().is_none());
    }

    #[test]
    fn draft_with_files() {
        let dep = parse(r#"{"id": 42, "state": "inprogress", "submitted": false,
            "files": [{"filename": "archive.tar.gz"}]}"#);
        assert_eq!(dep.state, DepositionState::FilesUploaded);
        assert_eq!(dep.files, vec!["archive.tar.gz"]);
    }

    #[test]
    fn published_deposition() {
        let dep = parse(r#"{"id": 42, "record_id": 42, "state": "done", "submitted": true,
            "doi": "10.5072/zenodo.42",
            "links": {"record_html": "https://sandbox.zenodo.org/records/42"}}"#);
        let record = dep.published_record().unwrap();
        assert_eq!(record.record_id, 42);
        assert_eq!(record.doi, "10.5072/zenodo.42");
        assert_eq!(record.url, "https://sandbox.zenodo.org/records/42");
    }

    #[test]
    fn published_doi_from_metadata() {
        let dep = parse(r#"{"id": 7, "record_id": 8, "submitted": true, "doi": "",
            "metadata": {"doi": "10.5072/zenodo.8"}}"#);
        assert_eq!(dep.published_record().unwrap().doi, "10.5072/zenodo.8");
    }

    #[test]
    fn scopes_checked_before_any_request() {
        let token = AccessToken::new("t", vec![SCOPE_WRITE.to_string()]);
        let client = ZenodoClient::new(Environment::Sandbox, token, Duration::from_secs(1))
            .unwrap()
            .with_api_base("http://127.0.0.1:9");
        assert!(matches!(
            client.check_scopes(),
            Err(DepositError::InsufficientScope { .. })
        ));
        // Publish refuses locally instead of surfacing a late server error.
        assert!(matches!(
            client.publish(1),
            Err(DepositError::InsufficientScope { .. })
        ));
    }

    #[test]
    fn oversized_file_rejected_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0_u8; 64]).unwrap();

        let token = AccessToken::new("t", vec![SCOPE_WRITE.into(), SCOPE_ACTIONS.into()]);
        let client = ZenodoClient::new(Environment::Sandbox, token, Duration::from_secs(1))
            .unwrap()
            .with_api_base("http://127.0.0.1:9")
            .with_max_file_bytes(16);
        // The unreachable API base proves no request was attempted.
        assert!(matches!(
            client.upload(1, &path),
            Err(DepositError::FileTooLarge { size: 64, limit: 16, .. })
        ));
    }

    fn local_client(server: &LocalServer) -> ZenodoClient {
        let token = AccessToken::new("tok", vec![SCOPE_WRITE.into(), SCOPE_ACTIONS.into()]);
        ZenodoClient::new(Environment::Sandbox, token, Duration::from_secs(5))
            .unwrap()
            .with_api_base(server.url())
            .with_retry(RetryPolicy::immediate(3))
    }

    #[test]
    fn http_statuses_map_onto_error_taxonomy() {
        let server = LocalServer::start(|_, seen| match seen.url.as_str() {
            "/deposit/depositions/404" => (404, r#"{"message": "not found"}"#.into()),
            "/deposit/depositions/401" => (401, r#"{"message": "invalid token"}"#.into()),
            "/deposit/depositions/403" => (403, "{}".into()),
            _ => (503, "unavailable".into()),
        });
        let client = local_client(&server);

        assert!(matches!(client.fetch(404), Err(DepositError::NotFound { .. })));
        assert!(matches!(client.fetch(401), Err(DepositError::AuthRequired { .. })));
        assert!(matches!(client.fetch(403), Err(DepositError::AuthRequired { .. })));
        let Err(err) = client.fetch(500) else {
            panic!("a 503 must fail");
        };
        assert!(matches!(err, DepositError::Service { status: 503, .. }));
        assert!(err.is_transient());

        assert_eq!(server.count("GET", "/deposit/depositions/500"), 3);
        assert_eq!(server.count("GET", "/deposit/depositions/404"), 1);
        assert!(server
            .seen()
            .iter()
            .all(|s| s.authorization.as_deref() == Some("Bearer tok")));
    }

    #[test]
    fn create_posts_metadata_and_returns_id() {
        let server = LocalServer::start(|_, seen| match (seen.method.as_str(), seen.url.as_str()) {
            ("POST", "/deposit/depositions") => {
                (201, r#"{"id": 77, "state": "unsubmitted", "submitted": false}"#.into())
            }
            _ => (404, "{}".into()),
        });
        assert_eq!(local_client(&server).create(&manifest()).unwrap(), 77);

        let seen = server.seen();
        assert_eq!(seen.len(), 1);
        let body = String::from_utf8_lossy(&seen[0].body);
        assert!(body.contains(r#""title":"Immune state geometry""#));
    }

    #[test]
    fn create_is_sent_once_on_transient_failure() {
        let server = LocalServer::start(|_, _| (502, "bad gateway".into()));
        let err = local_client(&server).create(&manifest()).err().unwrap();
        assert!(err.is_transient());
        assert_eq!(server.count("POST", "/deposit/depositions"), 1);
    }

    #[test]
    fn upload_puts_file_into_bucket() {
        let server = LocalServer::start(|base, seen| {
            match (seen.method.as_str(), seen.url.as_str()) {
                ("GET", "/deposit/depositions/7") => (
                    200,
                    format!(
                        r#"{{"id": 7, "state": "unsubmitted", "submitted": false,
                            "links": {{"bucket": "{base}/files/b7"}}}}"#
                    ),
                ),
                ("PUT", "/files/b7/archive.tar.gz") => (201, r#"{"key": "archive.tar.gz"}"#.into()),
                _ => (404, "{}".into()),
            }
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.tar.gz");
        let data = vec![7_u8; 4096];
        std::fs::write(&path, &data).unwrap();

        local_client(&server).upload(7, &path).unwrap();

        let put = server
            .seen()
            .into_iter()
            .find(|s| s.method == "PUT")
            .unwrap();
        assert_eq!(put.url, "/files/b7/archive.tar.gz");
        assert_eq!(put.body, data);
        assert_eq!(put.authorization.as_deref(), Some("Bearer tok"));
    }

    #[test]
    fn publish_of_published_deposition_sends_no_action() {
        let server = LocalServer::start(|_, seen| match seen.url.as_str() {
            "/deposit/depositions/8" => (
                200,
                r#"{"id": 8, "record_id": 8, "state": "done", "submitted": true,
                    "doi": "10.5072/zenodo.8",
                    "links": {"record_html": "https://sandbox.zenodo.org/records/8"}}"#
                    .into(),
            ),
            _ => (500, "{}".into()),
        });
        let record = local_client(&server).publish(8).unwrap();
        assert_eq!(record.doi, "10.5072/zenodo.8");
        assert_eq!(server.count("POST", "/"), 0);
    }

    #[test]
    fn publish_of_draft_mints_doi() {
        let server = LocalServer::start(|_, seen| match (seen.method.as_str(), seen.url.as_str()) {
            ("GET", "/deposit/depositions/9") => (
                200,
                r#"{"id": 9, "state": "inprogress", "submitted": false,
                    "files": [{"filename": "archive.tar.gz"}]}"#
                    .into(),
            ),
            ("POST", "/deposit/depositions/9/actions/publish") => (
                202,
                r#"{"id": 9, "record_id": 10, "state": "done", "submitted": true,
                    "doi": "10.5072/zenodo.10",
                    "links": {"record_html": "https://sandbox.zenodo.org/records/10"}}"#
                    .into(),
            ),
            _ => (404, "{}".into()),
        });
        let record = local_client(&server).publish(9).unwrap();
        assert_eq!(record.record_id, 10);
        assert_eq!(record.url, "https://sandbox.zenodo.org/records/10");
        assert_eq!(server.count("POST", "/deposit/depositions/9/actions/publish"), 1);
    }
}
