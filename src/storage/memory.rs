//! In-memory storage backend: deterministic file store for tests.
//!
//! Supports targeted fault injection (fail the next write/remove touching a
//! path substring) and flush counting, so crash-ordering and durability
//! properties can be exercised without a real filesystem.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{MstError, Result};
use crate::storage::backend::{FileStat, SharedBackend, StorageBackend};

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, String>,
    mtimes: BTreeMap<PathBuf, i64>,
    clock_ms: i64,
    flush_count: u64,
    flushed_paths: Vec<PathBuf>,
    /// Writes/removes touching a path containing this substring fail.
    fail_on_write_containing: Option<String>,
    write_log: Vec<PathBuf>,
}

/// Deterministic in-memory backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared trait-object handle.
    #[must_use]
    pub fn shared(&self) -> SharedBackend {
        Arc::new(self.clone())
    }

    /// Make every write/remove whose path contains `fragment` fail with an
    /// IO error until [`Self::clear_fault`].
    pub fn fail_writes_containing(&self, fragment: &str) {
        self.state.lock().fail_on_write_containing = Some(fragment.to_string());
    }

    pub fn clear_fault(&self) {
        self.state.lock().fail_on_write_containing = None;
    }

    /// Number of flush hints issued so far.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.state.lock().flush_count
    }

    /// Paths flushed so far, in order.
    #[must_use]
    pub fn flushed_paths(&self) -> Vec<PathBuf> {
        self.state.lock().flushed_paths.clone()
    }

    /// Paths written so far, in order. Lets tests assert write ordering
    /// (backup before primary, document before CSVs, …).
    #[must_use]
    pub fn write_log(&self) -> Vec<PathBuf> {
        self.state.lock().write_log.clone()
    }

    /// Raw file contents, if present.
    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    /// All stored paths.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().files.keys().cloned().collect()
    }

    fn check_fault(state: &MemoryState, path: &Path) -> Result<()> {
        if let Some(fragment) = &state.fail_on_write_containing
            && path.to_string_lossy().contains(fragment.as_str())
        {
            return Err(MstError::io(
                path,
                std::io::Error::other(format!("injected fault on {fragment:?}")),
            ));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.state.lock().files.get(path).cloned())
    }

    fn write_text(&self, path: &Path, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fault(&state, path)?;
        state.clock_ms += 1;
        let now = state.clock_ms;
        state.files.insert(path.to_path_buf(), text.to_string());
        state.mtimes.insert(path.to_path_buf(), now);
        state.write_log.push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock();
        state.files.contains_key(path)
            || state
                .files
                .keys()
                .any(|p| p.starts_with(path) && p != path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fault(&state, path)?;
        state.files.remove(path);
        state.mtimes.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fault(&state, path)?;
        state.files.retain(|p, _| !p.starts_with(path));
        state.mtimes.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock();
        let mut out: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }

    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        Ok(self
            .state
            .lock()
            .mtimes
            .get(path)
            .map(|&mtime_ms| FileStat { mtime_ms }))
    }

    fn flush(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if !state.files.contains_key(path) {
            return Err(MstError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }
        state.flush_count += 1;
        state.flushed_paths.push(path.to_path_buf());
        Ok(())
    }
}
