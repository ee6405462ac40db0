//! Local asset cache.
//!
//! Release assets are materialized as plain files named after the asset in a
//! single cache directory:
//!
//! ```text
//! <cache_root>/
//!   archive.tar.gz
//!   figures.zip
//!   .tmpXXXXXX     : in-flight download, renamed on completion
//! ```
//!
//! A file only appears under its final name after its size (and digest, when
//! the host publishes one) has been checked, so a concurrent `contains` never
//! observes a partial transfer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use depo_core::{persist_atomic, ContentHash};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{DepositError, Result};
use crate::release::{Asset, ReleaseSource};
use crate::retry::RetryPolicy;

/// Options controlling when the cache goes to the network.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Use any existing file with the asset's name without checking it.
    pub skip_acquisition: bool,
    /// Download even when a verified copy is already present.
    pub force: bool,
    /// Retry policy for transient transfer failures.
    pub retry: RetryPolicy,
    /// Maximum concurrent downloads in [`AssetCache::ensure_all`].
    pub workers: usize,
}

/// A directory of downloaded release assets.
#[derive(Debug, Clone)]
pub struct AssetCache {
    root: PathBuf,
    options: CacheOptions,
}

impl AssetCache {
    /// Create a cache rooted at the given directory.
    pub fn new(root: PathBuf, options: CacheOptions) -> Self {
        AssetCache { root, options }
    }

    /// Get the root directory of this cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an asset is (or would be) stored at.
    pub fn path_for(&self, asset: &Asset) -> Result<PathBuf> {
        validate_name(&asset.name)?;
        Ok(self.root.join(&asset.name))
    }

    /// Check if an asset file is present, without verifying its content.
    pub fn contains(&self, asset: &Asset) -> bool {
        self.path_for(asset).is_ok_and(|p| p.is_file())
    }

    /// Make sure `asset` exists locally and return its path.
    pub fn ensure(&self, source: &dyn ReleaseSource, asset: &Asset) -> Result<PathBuf> {
        let dest = self.path_for(asset)?;

        if dest.is_file() {
            if self.options.skip_acquisition {
                if !self.is_verified(asset, &dest)? {
                    return Err(DepositError::CacheError {
                        path: dest,
                        detail: format!(
                            "cached copy does not match the release's size or digest for '{}'; \
                             acquisition was skipped",
                            asset.name
                        ),
                    });
                }
                debug!("skip acquisition: using existing {}", dest.display());
                return Ok(dest);
            }
            if !self.options.force && self.is_verified(asset, &dest)? {
                debug!("cache hit: {}", dest.display());
                return Ok(dest);
            }
        }

        std::fs::create_dir_all(&self.root).map_err(|e| DepositError::CacheError {
            path: self.root.clone(),
            detail: format!("creating cache dir: {e}"),
        })?;

        self.options
            .retry
            .run(&format!("download of '{}'", asset.name), || {
                self.download_once(source, asset, &dest)
            })?;
        info!("downloaded {} ({} bytes)", asset.name, asset.size_bytes);
        Ok(dest)
    }

    /// Ensure every asset, using up to `workers` threads.
    ///
    /// Paths come back in the same order as `assets`. If any asset fails after
    /// its retries, the first failure (in asset order) is returned.
    pub fn ensure_all(&self, source: &dyn ReleaseSource, assets: &[Asset]) -> Result<Vec<PathBuf>> {
        let workers = self.options.workers.clamp(1, assets.len().max(1));
        if workers == 1 {
            return assets.iter().map(|a| self.ensure(source, a)).collect();
        }

        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<PathBuf>>>> =
            assets.iter().map(|_| Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(asset) = assets.get(idx) else {
                        break;
                    };
                    let outcome = self.ensure(source, asset);
                    let failed = outcome.is_err();
                    if let Ok(mut slot) = slots[idx].lock() {
                        *slot = Some(outcome);
                    }
                    if failed {
                        // Stop handing out new work; in-flight downloads finish.
                        next.store(assets.len(), Ordering::SeqCst);
                    }
                });
            }
        });

        let mut paths = Vec::with_capacity(assets.len());
        for (asset, slot) in assets.iter().zip(slots) {
            let outcome = slot.into_inner().ok().flatten().unwrap_or_else(|| {
                Err(DepositError::CacheError {
                    path: self.root.join(&asset.name),
                    detail: "download skipped after an earlier failure".to_string(),
                })
            });
            paths.push(outcome?);
        }
        Ok(paths)
    }

    /// Whether an existing file matches the asset's reported size and digest.
    fn is_verified(&self, asset: &Asset, path: &Path) -> Result<bool> {
        let len = std::fs::metadata(path)?.len();
        if len != asset.size_bytes {
            return Ok(false);
        }
        match &asset.content_hash {
            Some(expected) => Ok(expected.verify_file(path)?),
            None => Ok(true),
        }
    }

    fn download_once(&self, source: &dyn ReleaseSource, asset: &Asset, dest: &Path) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| DepositError::CacheError {
            path: self.root.clone(),
            detail: format!("creating temp file: {e}"),
        })?;

        let written = source.fetch(asset, tmp.as_file_mut())?;
        if written != asset.size_bytes {
            // Dropping `tmp` deletes the partial file.
            return Err(DepositError::IncompleteDownload {
                asset: asset.name.clone(),
                expected: asset.size_bytes,
                actual: written,
            });
        }

        if let Some(expected) = &asset.content_hash {
            let actual = ContentHash::compute_file(tmp.path())?;
            if &actual != expected {
                return Err(DepositError::ChecksumMismatch {
                    asset: asset.name.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        tmp.as_file().sync_all()?;
        persist_atomic(tmp, dest)?;
        Ok(())
    }
}

/// Reject names that would escape the cache directory.
fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(DepositError::InvalidAsset {
            name: name.to_string(),
            detail: "asset names must be plain file names".to_string(),
        });
    }
    Ok(())
}
