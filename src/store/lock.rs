//! Advisory per-root lock: a JSON marker file at `<root>/mission.lock`.
//!
//! The lock answers "who is allowed to be the active editor of this root"
//! across processes and tabs. It is advisory: a crashed writer leaves a
//! stale marker, which is why `acquire` takes a `recover` escape hatch that
//! deletes the existing marker and retries once. It does not protect
//! individual file writes; the save queue does that within one process.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MstError, Result};
use crate::core::paths::MissionLayout;
use crate::model::document::now_rfc3339;
use crate::storage::backend::StorageBackend;

/// Contents of the `mission.lock` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    /// Who holds the lock (shown to the user on conflict).
    pub owner: String,
    pub created_at: String,
}

/// File-based mutual exclusion per mission root.
pub struct LockManager<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> LockManager<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Acquire the lock for `root`, writing a marker with `owner`.
    ///
    /// Fails with [`MstError::Locked`] when a marker already exists. With
    /// `recover` set, an existing marker is deleted and acquisition retried
    /// once — for a UI session that believes it is the legitimate owner
    /// after a reload.
    pub fn acquire(&self, root: &Path, owner: &str, recover: bool) -> Result<()> {
        let marker_path = MissionLayout::new(root).lock_marker();
        if self.backend.exists(&marker_path) {
            if !recover {
                return Err(MstError::Locked {
                    root: root.to_path_buf(),
                });
            }
            self.backend.remove(&marker_path)?;
            if self.backend.exists(&marker_path) {
                // Someone re-created it between remove and the retry.
                return Err(MstError::Locked {
                    root: root.to_path_buf(),
                });
            }
        }
        let marker = LockMarker {
            owner: owner.to_string(),
            created_at: now_rfc3339(),
        };
        let text = serde_json::to_string_pretty(&marker)?;
        self.backend.write_text(&marker_path, &text)
    }

    /// Remove the lock marker. Idempotent.
    pub fn release(&self, root: &Path) -> Result<()> {
        self.backend.remove(&MissionLayout::new(root).lock_marker())
    }

    /// Whether a lock marker exists at `root`.
    pub fn has_lock(&self, root: &Path) -> bool {
        self.backend.exists(&MissionLayout::new(root).lock_marker())
    }

    /// Read the current marker, if any and parseable.
    pub fn read_marker(&self, root: &Path) -> Result<Option<LockMarker>> {
        let marker_path = MissionLayout::new(root).lock_marker();
        let Some(text) = self.backend.read_text(&marker_path)? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&text).ok())
    }
}
