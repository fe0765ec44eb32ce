//! Storage backend seam: the byte/text-level file operations the engine is
//! built on top of.
//!
//! The engine never touches `std::fs` directly; everything goes through
//! [`StorageBackend`] so tests can run against an in-memory double with
//! fault injection ([`crate::storage::memory::MemoryBackend`]) and the
//! Electron host can inject its own sandboxed file service.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::{MstError, Result};

/// File metadata the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime_ms: i64,
}

/// Injected byte/text-level file operations.
///
/// Contract notes:
/// - `read_text` returns `Ok(None)` for a missing file; other failures are
///   errors.
/// - `write_text` creates parent directories as needed and truncates.
/// - `remove` is idempotent: removing a missing file is `Ok`.
/// - `flush` is a best-effort durability hint (fsync where possible).
pub trait StorageBackend: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<Option<String>>;
    fn write_text(&self, path: &Path, text: &str) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    fn stat(&self, path: &Path) -> Result<Option<FileStat>>;
    fn flush(&self, path: &Path) -> Result<()>;
}

/// Shared backend handle.
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Standard-filesystem backend.
#[derive(Debug, Default)]
pub struct StdFsBackend;

impl StdFsBackend {
    /// Shared handle around a std-fs backend.
    #[must_use]
    pub fn shared() -> SharedBackend {
        Arc::new(Self)
    }
}

impl StorageBackend for StdFsBackend {
    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MstError::io(path, e)),
        }
    }

    fn write_text(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MstError::io(parent, e))?;
        }
        fs::write(path, text).map_err(|e| MstError::io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MstError::io(path, e)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MstError::io(path, e)),
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| MstError::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MstError::io(dir, e))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MstError::io(path, e)),
        };
        let mtime = meta.modified().map_err(|e| MstError::io(path, e))?;
        let mtime_ms = mtime
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Ok(Some(FileStat { mtime_ms }))
    }

    fn flush(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| MstError::io(path, e))?;
        sync_file(&file, path)
    }
}

fn sync_file(file: &File, path: &Path) -> Result<()> {
    file.sync_data().map_err(|e| MstError::io(path, e))
}
