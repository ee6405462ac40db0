//! Atomic file replacement.
//!
//! Content is written to a temporary file in the destination directory and
//! renamed over the target, so readers see either the old file or the
//! complete new one.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CoreError, Result};

/// Atomically replace `path` with `data`, creating parent directories.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent).map_err(|source| CoreError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| CoreError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    tmp.write_all(data)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| CoreError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
    persist_atomic(tmp, path)
}

/// Rename a fully written temporary file into place.
pub fn persist_atomic(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
