//! WAL stager: the fast, frequent, full-bundle snapshot writer.
//!
//! One JSON file at `logs/wal/current.wal` holds a self-contained copy of
//! the entire bundle. Cheap relative to a checkpoint because it never
//! rewrites per-track CSV files; intended to run on a short debounce after
//! any edit, bounding data loss between checkpoints.

use std::path::Path;

use crate::core::errors::Result;
use crate::core::paths::MissionLayout;
use crate::model::bundle::{MissionBundle, WalSnapshot};
use crate::storage::backend::StorageBackend;

/// Options for one stage operation.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Stamp the document's `updated_at` to now before writing. On by
    /// default; the reconciler's self-heal path turns it off so a recovered
    /// snapshot keeps its original timestamp.
    pub touch_updated_at: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            touch_updated_at: true,
        }
    }
}

/// Writes WAL snapshots for one backend.
pub struct WalStager<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> WalStager<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Serialize the whole bundle to the WAL file and flush it.
    ///
    /// Mutates the bundle: `updated_at` is stamped unless opted out, so the
    /// caller's in-memory state matches what just became durable.
    pub fn stage(&self, bundle: &mut MissionBundle, opts: StageOptions) -> Result<()> {
        if opts.touch_updated_at {
            bundle.document.touch();
        }
        let wal_path = MissionLayout::new(&bundle.root).wal();
        let snapshot = WalSnapshot::of(bundle);
        let text = serde_json::to_string(&snapshot)?;
        self.backend.write_text(&wal_path, &text)?;
        self.backend.flush(&wal_path)
    }

    /// Force a durability flush of the current WAL file, if present.
    pub fn flush(&self, root: &Path) -> Result<()> {
        let wal_path = MissionLayout::new(root).wal();
        if self.backend.exists(&wal_path) {
            self.backend.flush(&wal_path)?;
        }
        Ok(())
    }

    /// Read the WAL snapshot at `root`, if one exists.
    ///
    /// A WAL with a foreign schema version is a hard error (the engine must
    /// not guess at its contents). A WAL that fails to parse at all is
    /// treated as absent: recovery then falls back to the checkpoint, and
    /// only when that is unreadable too does the open fail.
    pub fn read_snapshot(&self, root: &Path) -> Result<Option<WalSnapshot>> {
        let wal_path = MissionLayout::new(root).wal();
        let Some(text) = self.backend.read_text(&wal_path)? else {
            return Ok(None);
        };
        let Ok(snapshot) = serde_json::from_str::<WalSnapshot>(&text) else {
            return Ok(None);
        };
        snapshot.check_schema()?;
        Ok(Some(snapshot))
    }

    /// Delete the WAL file (idempotent). Marks the WAL as "consumed".
    pub fn clear(&self, root: &Path) -> Result<()> {
        self.backend.remove(&MissionLayout::new(root).wal())
    }
}
