//! Recovery reconciler: turn whatever is on disk back into one bundle.
//!
//! On open, two snapshots may exist and disagree: the authoritative
//! checkpoint (document + geometry + CSVs) and the faster WAL. The
//! reconciler loads both, keeps whichever carries the later `updated_at`,
//! and self-heals the loser — a winning WAL is immediately re-checkpointed
//! and cleared so the store never keeps serving a WAL-only state, and a
//! losing WAL is deleted. Secondary cleanup (backup repair, stale-WAL
//! removal) is best-effort and never fails the open.

use std::path::Path;

use crate::codec::csv;
use crate::core::errors::{MstError, Result};
use crate::core::paths::MissionLayout;
use crate::model::bundle::{FeatureCollection, MissionBundle};
use crate::model::document::{MissionDocument, parse_rfc3339};
use crate::storage::backend::StorageBackend;
use crate::store::checkpoint::{CheckpointOptions, CheckpointWriter};
use crate::store::wal::WalStager;

/// Which snapshot produced the opened bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// Checkpoint present, no (usable) WAL.
    CheckpointOnly,
    /// WAL present, no (usable) checkpoint.
    WalOnly,
    /// Both present; the checkpoint was newer or tied.
    CheckpointNewer,
    /// Both present; the WAL was newer and has been re-checkpointed.
    WalNewer,
}

/// What recovery did, for logging and the CLI `verify` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub source: RecoverySource,
    /// `mission.json` was rebuilt from `mission.json.bak`.
    pub backup_repaired: bool,
    /// A stale WAL file was deleted after the checkpoint won.
    pub stale_wal_removed: bool,
}

/// Reconciles the checkpoint and WAL views of one mission root.
pub struct Reconciler<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> Reconciler<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Open `root`, reconciling and self-healing as needed.
    pub fn open(&self, root: &Path) -> Result<(MissionBundle, RecoveryReport)> {
        self.open_inner(root, true)
    }

    /// Read-only reconciliation: reports what `open` would decide without
    /// repairing the primary, re-checkpointing, or deleting anything.
    pub fn inspect(&self, root: &Path) -> Result<(MissionBundle, RecoveryReport)> {
        self.open_inner(root, false)
    }

    fn open_inner(&self, root: &Path, heal: bool) -> Result<(MissionBundle, RecoveryReport)> {
        let layout = MissionLayout::new(root);
        let stager = WalStager::new(self.backend);

        let (checkpoint_doc, backup_repaired) = self.load_document(&layout, heal)?;
        let checkpoint_bundle = match checkpoint_doc {
            Some(doc) => Some(self.load_checkpoint_bundle(&layout, doc)?),
            None => None,
        };
        let wal_bundle = stager
            .read_snapshot(root)?
            .map(|snap| snap.into_bundle(root.to_path_buf()));

        let mut report = RecoveryReport {
            source: RecoverySource::CheckpointOnly,
            backup_repaired,
            stale_wal_removed: false,
        };

        let bundle = match (checkpoint_bundle, wal_bundle) {
            (None, None) => {
                return Err(MstError::NothingToOpen {
                    root: root.to_path_buf(),
                });
            }
            (Some(cp), None) => {
                report.source = RecoverySource::CheckpointOnly;
                cp
            }
            (None, Some(wal)) => {
                report.source = RecoverySource::WalOnly;
                if heal {
                    self.promote_wal(&wal)?;
                }
                wal
            }
            (Some(cp), Some(wal)) => {
                if wal_is_newer(&wal.document, &cp.document) {
                    report.source = RecoverySource::WalNewer;
                    if heal {
                        self.promote_wal(&wal)?;
                    }
                    wal
                } else {
                    report.source = RecoverySource::CheckpointNewer;
                    if heal {
                        // Secondary cleanup: a failure here must not block
                        // the open.
                        report.stale_wal_removed = stager.clear(root).is_ok();
                    }
                    cp
                }
            }
        };

        bundle.document.check_schema()?;
        bundle.document.validate()?;
        Ok((bundle, report))
    }

    /// Primary document, else backup (repairing the primary best-effort).
    fn load_document(
        &self,
        layout: &MissionLayout,
        heal: bool,
    ) -> Result<(Option<MissionDocument>, bool)> {
        if let Some(doc) = self.read_document(&layout.document())? {
            return Ok((Some(doc), false));
        }
        let backup_path = layout.document_backup();
        let Some(text) = self.backend.read_text(&backup_path)? else {
            return Ok((None, false));
        };
        let Ok(doc) = serde_json::from_str::<MissionDocument>(&text) else {
            return Ok((None, false));
        };
        if heal {
            // Best-effort repair; the backup alone is enough to serve.
            let _ = self.backend.write_text(&layout.document(), &text);
        }
        Ok((Some(doc), true))
    }

    fn read_document(&self, path: &Path) -> Result<Option<MissionDocument>> {
        let Some(text) = self.backend.read_text(path)? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&text).ok())
    }

    fn load_checkpoint_bundle(
        &self,
        layout: &MissionLayout,
        doc: MissionDocument,
    ) -> Result<MissionBundle> {
        // The schema gate runs before geometry/CSV loading so a foreign
        // document fails fast instead of half-loading.
        doc.check_schema()?;

        let routes = self.load_collection(layout, &doc.files.routes)?;
        let markers = self.load_collection(layout, &doc.files.markers)?;

        let mut bundle = MissionBundle::new(layout.root().to_path_buf(), doc);
        bundle.routes = routes;
        bundle.markers = markers;
        for track in bundle.document.tracks.clone() {
            let csv_path = layout.resolve(&track.file);
            let points = match self.backend.read_text(&csv_path)? {
                // A WAL-only crash can leave a roster entry whose CSV was
                // never checkpointed; that is an empty track, not an error.
                None => Vec::new(),
                Some(text) => csv::parse_csv(&text, &csv_path)?,
            };
            bundle.tracks.insert(track.id, points);
        }
        Ok(bundle)
    }

    fn load_collection(&self, layout: &MissionLayout, rel: &str) -> Result<FeatureCollection> {
        let path = layout.resolve(rel);
        let Some(text) = self.backend.read_text(&path)? else {
            return Ok(FeatureCollection::default());
        };
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    /// Self-heal: make the winning WAL state the checkpoint and consume it.
    fn promote_wal(&self, bundle: &MissionBundle) -> Result<()> {
        CheckpointWriter::new(self.backend).write(bundle, CheckpointOptions { clear_wal: true })
    }
}

/// Wall-clock comparison of the two snapshots' `updated_at` stamps.
///
/// Ties and unparseable stamps go to the checkpoint, the authoritative
/// store. Known limitation: clock skew after sleep/resume or an NTP step
/// can pick the wrong side.
fn wal_is_newer(wal_doc: &MissionDocument, checkpoint_doc: &MissionDocument) -> bool {
    match (
        parse_rfc3339(&wal_doc.updated_at),
        parse_rfc3339(&checkpoint_doc.updated_at),
    ) {
        (Some(wal), Some(cp)) => wal > cp,
        (Some(_), None) => true,
        _ => false,
    }
}
