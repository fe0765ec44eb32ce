//! Checkpoint writer: the slower, authoritative multi-file commit.
//!
//! Write ordering is the durability argument: the backup document goes to
//! disk (and is flushed) before the primary is touched, so a crash mid-write
//! always leaves at least one complete document state on disk. Geometry
//! collections follow, then every track CSV is rewritten in full from the
//! in-memory point list — O(points) per checkpoint, but immune to the
//! append-desync failure modes of incremental CSV writes. A successful
//! checkpoint consumes the WAL unless explicitly told to retain it.

use crate::core::errors::Result;
use crate::core::paths::MissionLayout;
use crate::codec::csv;
use crate::model::bundle::MissionBundle;
use crate::storage::backend::StorageBackend;
use crate::store::wal::WalStager;

/// Options for one checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointOptions {
    /// Remove the WAL file after a successful checkpoint. On by default.
    pub clear_wal: bool,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self { clear_wal: true }
    }
}

/// Writes checkpoints for one backend.
pub struct CheckpointWriter<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> CheckpointWriter<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Commit the bundle to its checkpoint files.
    pub fn write(&self, bundle: &MissionBundle, opts: CheckpointOptions) -> Result<()> {
        let layout = MissionLayout::new(&bundle.root);
        let doc_text = serde_json::to_string_pretty(&bundle.document)?;

        // Backup before primary: bounds the damage of a mid-write crash.
        let backup_path = layout.document_backup();
        self.backend.write_text(&backup_path, &doc_text)?;
        self.backend.flush(&backup_path)?;

        let primary_path = layout.document();
        self.backend.write_text(&primary_path, &doc_text)?;
        self.backend.flush(&primary_path)?;

        self.backend.write_text(
            &layout.resolve(&bundle.document.files.routes),
            &serde_json::to_string_pretty(&bundle.routes)?,
        )?;
        self.backend.write_text(
            &layout.resolve(&bundle.document.files.markers),
            &serde_json::to_string_pretty(&bundle.markers)?,
        )?;

        for track in &bundle.document.tracks {
            let text = csv::to_csv(bundle.points_of(&track.id));
            self.backend.write_text(&layout.resolve(&track.file), &text)?;
        }

        if opts.clear_wal {
            WalStager::new(self.backend).clear(&bundle.root)?;
        }
        Ok(())
    }
}
