//! In-memory stand-ins for the hosting and deposit services, used by tests.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use depo_core::{ContentHash, Environment};

use crate::client::{
    check_file_size, Deposition, DepositionService, DepositionState, PublishedRecord,
    DEFAULT_MAX_FILE_BYTES,
};
use crate::error::{DepositError, Result};
use crate::manifest::{Author, MetadataManifest};
use crate::release::{Asset, Release, ReleaseSource};

pub(crate) fn asset_for(name: &str, bytes: &[u8]) -> Asset {
    Asset {
        name: name.to_string(),
        download_url: format!("https://example.invalid/download/{name}"),
        size_bytes: bytes.len() as u64,
        content_hash: Some(ContentHash::compute(bytes)),
    }
}

pub(crate) fn manifest() -> MetadataManifest {
    MetadataManifest {
        title: "Immune state geometry".into(),
        description: "Processed tables and figure sources".into(),
        authors: vec![Author {
            name: "Doe, Jane".into(),
            affiliation: Some("Institute".into()),
            identifier: None,
        }],
        keywords: vec!["provenance".into()],
        license: Some("MIT".into()),
        related_identifiers: vec![],
        upload_type: "software".into(),
        version: None,
        access_right: "open".into(),
    }
}

/// A release host serving a single tag from memory.
pub(crate) struct StubSource {
    tag: String,
    assets: Vec<(Asset, Vec<u8>)>,
    truncated: HashMap<String, usize>,
    failures_left: Mutex<usize>,
    fetches: AtomicUsize,
    lookups: AtomicUsize,
}

impl StubSource {
    pub(crate) fn new(tag: &str) -> Self {
        StubSource {
            tag: tag.to_string(),
            assets: Vec::new(),
            truncated: HashMap::new(),
            failures_left: Mutex::new(0),
            fetches: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_asset(mut self, name: &str, bytes: &[u8]) -> Self {
        self.assets.push((asset_for(name, bytes), bytes.to_vec()));
        self
    }

    /// Serve only the first `len` bytes of an asset, every time.
    pub(crate) fn truncate(mut self, name: &str, len: usize) -> Self {
        self.truncated.insert(name.to_string(), len);
        self
    }

    /// Time out on the first `n` fetches.
    pub(crate) fn fail_first_fetches(self, n: usize) -> Self {
        *self.failures_left.lock().unwrap() = n;
        self
    }

    pub(crate) fn asset(&self, name: &str) -> Asset {
        self.assets
            .iter()
            .find(|(a, _)| a.name == name)
            .map(|(a, _)| a.clone())
            .unwrap()
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for StubSource {
    fn release(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if tag != self.tag {
            return Err(DepositError::NotFound {
                what: format!("release {owner}/{repo}@{tag}"),
            });
        }
        Ok(Release {
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
            assets: self.assets.iter().map(|(a, _)| a.clone()).collect(),
        })
    }

    fn fetch(&self, asset: &Asset, sink: &mut dyn Write) -> Result<u64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(DepositError::NetworkTimeout {
                    context: format!("download of '{}'", asset.name),
                });
            }
        }
        let bytes = self
            .assets
            .iter()
            .find(|(a, _)| a.name == asset.name)
            .map(|(_, b)| b.as_slice())
            .ok_or_else(|| DepositError::NotFound {
                what: format!("asset '{}'", asset.name),
            })?;
        let served = match self.truncated.get(&asset.name) {
            Some(len) => &bytes[..(*len).min(bytes.len())],
            None => bytes,
        };
        sink.write_all(served)?;
        Ok(served.len() as u64)
    }
}

#[derive(Default)]
struct StubDeposition {
    metadata: Option<MetadataManifest>,
    files: Vec<String>,
    published: Option<PublishedRecord>,
}

#[derive(Default)]
struct StubState {
    next_id: u64,
    depositions: BTreeMap<u64, StubDeposition>,
    creates: usize,
    metadata_updates: usize,
    uploads: usize,
    publishes: usize,
    fetches: usize,
    fail_upload_of: Option<String>,
}

/// A deposit service keeping depositions in memory.
pub(crate) struct StubService {
    environment: Environment,
    max_file_bytes: u64,
    state: Mutex<StubState>,
}

impl StubService {
    pub(crate) fn new(environment: Environment) -> Self {
        StubService {
            environment,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            state: Mutex::new(StubState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn with_next_id(self, id: u64) -> Self {
        self.state.lock().unwrap().next_id = id;
        self
    }

    pub(crate) fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Pre-seed an unpublished draft holding `files`.
    pub(crate) fn with_draft(self, id: u64, files: &[&str]) -> Self {
        self.state.lock().unwrap().depositions.insert(
            id,
            StubDeposition {
                metadata: Some(manifest()),
                files: files.iter().map(|f| f.to_string()).collect(),
                published: None,
            },
        );
        self
    }

    pub(crate) fn fail_uploads_of(self, name: &str) -> Self {
        self.state.lock().unwrap().fail_upload_of = Some(name.to_string());
        self
    }

    pub(crate) fn clear_upload_failure(&self) {
        self.state.lock().unwrap().fail_upload_of = None;
    }

    pub(crate) fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub(crate) fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub(crate) fn publishes(&self) -> usize {
        self.state.lock().unwrap().publishes
    }

    pub(crate) fn metadata_updates(&self) -> usize {
        self.state.lock().unwrap().metadata_updates
    }

    pub(crate) fn total_calls(&self) -> usize {
        let s = self.state.lock().unwrap();
        s.creates + s.metadata_updates + s.uploads + s.publishes + s.fetches
    }

    pub(crate) fn files_of(&self, id: u64) -> Vec<String> {
        self.state.lock().unwrap().depositions[&id].files.clone()
    }
}

impl DepositionService for StubService {
    fn environment(&self) -> Environment {
        self.environment
    }

    fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    fn create(&self, metadata: &MetadataManifest) -> Result<u64> {
        metadata.validate()?;
        let mut s = self.state.lock().unwrap();
        s.creates += 1;
        let id = s.next_id;
        s.next_id += 1;
        s.depositions.insert(
            id,
            StubDeposition {
                metadata: Some(metadata.clone()),
                ..Default::default()
            },
        );
        Ok(id)
    }

    fn fetch(&self, deposition_id: u64) -> Result<Deposition> {
        let mut s = self.state.lock().unwrap();
        s.fetches += 1;
        let dep = s
            .depositions
            .get(&deposition_id)
            .ok_or_else(|| DepositError::NotFound {
                what: format!("deposition {deposition_id}"),
            })?;
        let state = match (&dep.published, dep.files.is_empty()) {
            (Some(_), _) => DepositionState::Published,
            (None, true) => DepositionState::Draft,
            (None, false) => DepositionState::FilesUploaded,
        };
        Ok(Deposition {
            id: deposition_id,
            environment: self.environment,
            state,
            record_id: dep.published.as_ref().map(|r| r.record_id),
            doi: dep.published.as_ref().map(|r| r.doi.clone()),
            url: dep.published.as_ref().map(|r| r.url.clone()),
            files: dep.files.clone(),
        })
    }

    fn attach_metadata(&self, deposition_id: u64, metadata: &MetadataManifest) -> Result<()> {
        metadata.validate()?;
        let mut s = self.state.lock().unwrap();
        s.metadata_updates += 1;
        let dep = s
            .depositions
            .get_mut(&deposition_id)
            .ok_or_else(|| DepositError::NotFound {
                what: format!("deposition {deposition_id}"),
            })?;
        dep.metadata = Some(metadata.clone());
        Ok(())
    }

    fn upload(&self, deposition_id: u64, local_path: &Path) -> Result<()> {
        let size = std::fs::metadata(local_path)?.len();
        check_file_size(local_path, size, self.max_file_bytes)?;
        let name = local_path.file_name().unwrap().to_string_lossy().to_string();
        let mut s = self.state.lock().unwrap();
        s.uploads += 1;
        if s.fail_upload_of.as_deref() == Some(name.as_str()) {
            return Err(DepositError::Service {
                context: format!("upload of '{name}'"),
                status: 400,
                detail: "rejected by stub".into(),
            });
        }
        let dep = s
            .depositions
            .get_mut(&deposition_id)
            .ok_or_else(|| DepositError::NotFound {
                what: format!("deposition {deposition_id}"),
            })?;
        if !dep.files.contains(&name) {
            dep.files.push(name);
        }
        Ok(())
    }

    fn publish(&self, deposition_id: u64) -> Result<PublishedRecord> {
        let environment = self.environment;
        let mut s = self.state.lock().unwrap();
        s.publishes += 1;
        let dep = s
            .depositions
            .get_mut(&deposition_id)
            .ok_or_else(|| DepositError::NotFound {
                what: format!("deposition {deposition_id}"),
            })?;
        if let Some(record) = &dep.published {
            return Ok(record.clone());
        }
        let record = PublishedRecord {
            record_id: deposition_id,
            doi: environment.doi_for(deposition_id),
            url: environment.record_url(deposition_id),
        };
        dep.published = Some(record.clone());
        Ok(record)
    }
}

/// One request observed by [`LocalServer`].
#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
    pub authorization: Option<String>,
}

type Handler = dyn Fn(&str, &Seen) -> (u16, String) + Send + 'static;

/// A loopback HTTP server answering every request through a handler that
/// receives the server's base URL and the request.
pub(crate) struct LocalServer {
    server: Arc<tiny_http::Server>,
    base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
    worker: Option<JoinHandle<()>>,
}

impl LocalServer {
    pub(crate) fn start(handler: impl Fn(&str, &Seen) -> (u16, String) + Send + 'static) -> Self {
        let server = Arc::new(tiny_http::Server::http("127.0.0.1:0").unwrap());
        let addr = server.server_addr().to_ip().unwrap();
        let base = format!("http://{addr}");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handler: Box<Handler> = Box::new(handler);
        let worker = {
            let server = Arc::clone(&server);
            let seen = Arc::clone(&seen);
            let base = base.clone();
            std::thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = Vec::new();
                    request.as_reader().read_to_end(&mut body).unwrap();
                    let authorization = request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv("Authorization"))
                        .map(|h| h.value.as_str().to_string());
                    let entry = Seen {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        body,
                        authorization,
                    };
                    let (status, reply) = handler(&base, &entry);
                    seen.lock().unwrap().push(entry);
                    let response = tiny_http::Response::from_string(reply)
                        .with_status_code(status)
                        .with_header(
                            tiny_http::Header::from_bytes("Content-Type", "application/json")
                                .unwrap(),
                        );
                    let _ = request.respond(response);
                }
            })
        };

        LocalServer {
            server,
            base,
            seen,
            worker: Some(worker),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.base
    }

    pub(crate) fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Requests with this method whose URL starts with `prefix`.
    pub(crate) fn count(&self, method: &str, prefix: &str) -> usize {
        self.seen()
            .iter()
            .filter(|s| s.method == method && s.url.starts_with(prefix))
            .count()
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
