//! Repository façade over the persistence pipeline.
//!
//! Composes the lock manager, WAL stager, checkpoint writer, reconciler and
//! per-root save queue behind a handful of mission-level operations. Every
//! durable write goes through the queue; every operation emits an activity
//! log entry. Callers hold the returned [`MissionBundle`] as plain data and
//! hand an updated copy back for each save.

#![allow(missing_docs)]

use std::path::Path;
use std::time::Instant;

use serde_json::Value;

use crate::core::config::EngineConfig;
use crate::core::errors::{MstError, Result};
use crate::logger::{ActivityLog, EventType, LogEntry, Severity};
use crate::model::bundle::MissionBundle;
use crate::model::document::{MissionDocument, MissionKind};
use crate::storage::backend::{SharedBackend, StorageBackend};
use crate::store::checkpoint::{CheckpointOptions, CheckpointWriter};
use crate::store::lock::LockManager;
use crate::store::queue::SaveQueue;
use crate::store::recover::{Reconciler, RecoveryReport, RecoverySource};
use crate::store::wal::{StageOptions, WalStager};

/// Knobs for [`Repository::open_mission`].
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Acquire the advisory lock for the opened root.
    pub acquire_lock: bool,
    /// Steal a stale lock marker left by a dead process.
    pub recover_lock: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            acquire_lock: true,
            recover_lock: false,
        }
    }
}

/// Mission-level persistence operations.
pub struct Repository {
    backend: SharedBackend,
    config: EngineConfig,
    queue: SaveQueue,
    log: ActivityLog,
}

impl Repository {
    pub fn new(backend: SharedBackend, config: EngineConfig) -> Self {
        let log = ActivityLog::from_config(&config.activity_log);
        Self {
            backend,
            config,
            queue: SaveQueue::new(),
            log,
        }
    }

    /// Same repository with logging turned off; used by tooling that must
    /// not touch the activity log.
    pub fn without_log(backend: SharedBackend, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            queue: SaveQueue::new(),
            log: ActivityLog::disabled(),
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    // ──────────────────── lifecycle ────────────────────

    /// Create a fresh mission at `root` and write its first checkpoint.
    ///
    /// Named missions take the advisory lock; drafts are scratch space and
    /// stay unlocked. Fails if the root already holds a document.
    pub fn create_mission(&self, root: &Path, kind: MissionKind) -> Result<MissionBundle> {
        let started = Instant::now();
        let result = self.queue.run(root, || self.create_locked(root, kind));
        self.log_outcome(EventType::MissionCreate, root, &result, started, |bundle, e| {
            e.mission_id = Some(bundle.document.mission_id.clone());
            e.details = Some(bundle.document.kind.display_name().to_string());
        });
        result
    }

    fn create_locked(&self, root: &Path, kind: MissionKind) -> Result<MissionBundle> {
        let layout = crate::core::paths::MissionLayout::new(root);
        if self.backend.exists(&layout.document()) {
            return Err(MstError::InvalidDocument {
                details: format!("mission already exists at {}", root.display()),
            });
        }
        let lock_it = !kind.is_draft();
        let document = MissionDocument::new(kind);
        let bundle = MissionBundle::new(root.to_path_buf(), document);

        if lock_it {
            self.acquire_lock_inner(root, false)?;
        }
        let write = CheckpointWriter::new(self.backend.as_ref())
            .write(&bundle, CheckpointOptions::default());
        if let Err(err) = write {
            if lock_it {
                let _ = LockManager::new(self.backend.as_ref()).release(root);
            }
            return Err(err);
        }
        Ok(bundle)
    }

    /// Open an existing mission, reconciling the checkpoint and WAL.
    pub fn open_mission(&self, root: &Path, opts: OpenOptions) -> Result<MissionBundle> {
        let started = Instant::now();
        let result = self.queue.run(root, || self.open_locked(root, opts));
        self.log_outcome(EventType::MissionOpen, root, &result, started, |(bundle, report), e| {
            e.mission_id = Some(bundle.document.mission_id.clone());
            e.details = Some(format!("source={:?}", report.source));
        });
        let (bundle, report) = result?;
        self.log_recovery(root, &bundle, &report);
        Ok(bundle)
    }

    fn open_locked(
        &self,
        root: &Path,
        opts: OpenOptions,
    ) -> Result<(MissionBundle, RecoveryReport)> {
        if opts.acquire_lock {
            self.acquire_lock_inner(root, opts.recover_lock)?;
        }
        let result = Reconciler::new(self.backend.as_ref()).open(root);
        if result.is_err() && opts.acquire_lock {
            let _ = LockManager::new(self.backend.as_ref()).release(root);
        }
        result
    }

    /// Promote a draft into a named mission at a new root.
    ///
    /// The draft is opened without a lock, its tracks, points, geometry and
    /// recording pointers are carried over verbatim, and the new mission
    /// gets a fresh identity. The draft root is deleted once the named
    /// mission is durably saved.
    pub fn convert_draft_to_mission(
        &self,
        draft_root: &Path,
        dest_root: &Path,
        name: &str,
    ) -> Result<MissionBundle> {
        let started = Instant::now();
        let result = self.promote_draft(draft_root, dest_root, name);
        self.log_outcome(EventType::DraftPromote, dest_root, &result, started, |bundle, e| {
            e.mission_id = Some(bundle.document.mission_id.clone());
            e.details = Some(format!("from {}", draft_root.display()));
        });
        result
    }

    fn promote_draft(
        &self,
        draft_root: &Path,
        dest_root: &Path,
        name: &str,
    ) -> Result<MissionBundle> {
        let (draft, _) = self.queue.run(draft_root, || {
            self.open_locked(
                draft_root,
                OpenOptions {
                    acquire_lock: false,
                    recover_lock: false,
                },
            )
        })?;
        if !draft.document.kind.is_draft() {
            return Err(MstError::InvalidDocument {
                details: format!("{} is not a draft mission", draft_root.display()),
            });
        }

        // Fresh identity, everything else carried over.
        let mut document = MissionDocument::new(MissionKind::Named {
            name: name.to_string(),
        });
        document.active_tracks = draft.document.active_tracks.clone();
        document.tracks = draft.document.tracks.clone();
        document.files = draft.document.files.clone();

        let mut bundle = MissionBundle::new(dest_root.to_path_buf(), document);
        bundle.routes = draft.routes.clone();
        bundle.markers = draft.markers.clone();
        bundle.tracks = draft.tracks.clone();

        self.queue.run(dest_root, || {
            self.acquire_lock_inner(dest_root, false)?;
            CheckpointWriter::new(self.backend.as_ref())
                .write(&bundle, CheckpointOptions::default())
        })?;

        // Draft removal is cleanup, not the durability guarantee.
        let removed = self
            .queue
            .run(draft_root, || self.backend.remove_dir_all(draft_root));
        if let Err(err) = removed {
            self.log.record(
                &LogEntry::new(EventType::Error, Severity::Warning)
                    .with_root(draft_root)
                    .with_error(&err),
            );
        }
        Ok(bundle)
    }

    // ──────────────────── saves ────────────────────

    /// Stage the bundle into the WAL (the fast half of a save).
    pub fn stage_mission(&self, bundle: &mut MissionBundle) -> Result<()> {
        let started = Instant::now();
        let root = bundle.root.clone();
        let result = self.queue.run(&root, || {
            WalStager::new(self.backend.as_ref()).stage(bundle, StageOptions::default())
        });
        self.log_outcome(EventType::WalStage, &root, &result, started, |(), _| {});
        result
    }

    /// Force a durability flush of the current WAL file. Does not rewrite
    /// anything: the WAL stays in place for the next checkpoint to consume.
    pub fn flush_mission(&self, root: &Path) -> Result<()> {
        let started = Instant::now();
        let result = self
            .queue
            .run(root, || WalStager::new(self.backend.as_ref()).flush(root));
        self.log_outcome(EventType::WalFlush, root, &result, started, |(), _| {});
        result
    }

    /// Checkpoint the bundle: canonical files rewritten, WAL consumed.
    pub fn checkpoint_mission(&self, bundle: &MissionBundle) -> Result<()> {
        let started = Instant::now();
        let result = self.queue.run(&bundle.root, || {
            CheckpointWriter::new(self.backend.as_ref())
                .write(bundle, CheckpointOptions::default())
        });
        self.log_outcome(EventType::Checkpoint, &bundle.root, &result, started, |(), _| {});
        result
    }

    /// The full commit: stage then checkpoint under one queue slot, so no
    /// other save for this root can interleave between the two halves.
    pub fn save_mission(&self, bundle: &mut MissionBundle) -> Result<()> {
        let started = Instant::now();
        let root = bundle.root.clone();
        let result = self.queue.run(&root, || {
            let backend = self.backend.as_ref();
            WalStager::new(backend).stage(bundle, StageOptions::default())?;
            CheckpointWriter::new(backend).write(bundle, CheckpointOptions::default())
        });
        self.log_outcome(EventType::Checkpoint, &root, &result, started, |(), e| {
            e.details = Some("full save".to_string());
        });
        result
    }

    /// Apply lane-generator output to the routes collection and commit.
    ///
    /// Features previously generated for `parent_area_id` are replaced
    /// wholesale by `generated`.
    pub fn merge_generated_features(
        &self,
        bundle: &mut MissionBundle,
        parent_area_id: &str,
        generated: Vec<Value>,
    ) -> Result<()> {
        bundle.routes.merge_generated(parent_area_id, generated);
        self.save_mission(bundle)
    }

    // ──────────────────── locking ────────────────────

    pub fn has_lock(&self, root: &Path) -> bool {
        LockManager::new(self.backend.as_ref()).has_lock(root)
    }

    pub fn acquire_lock(&self, root: &Path, recover: bool) -> Result<()> {
        self.queue.run(root, || self.acquire_lock_inner(root, recover))
    }

    pub fn release_lock(&self, root: &Path) -> Result<()> {
        let result = self
            .queue
            .run(root, || LockManager::new(self.backend.as_ref()).release(root));
        let entry = LogEntry::new(EventType::LockRelease, Severity::Info).with_root(root);
        self.log.record(&entry);
        result
    }

    fn acquire_lock_inner(&self, root: &Path, recover: bool) -> Result<()> {
        let manager = LockManager::new(self.backend.as_ref());
        let owner = &self.config.lock.owner_tag;
        let had_marker = recover && manager.read_marker(root).ok().flatten().is_some();
        match manager.acquire(root, owner, recover) {
            Ok(()) => {
                let event = if had_marker {
                    EventType::LockRecovered
                } else {
                    EventType::LockAcquire
                };
                self.log
                    .record(&LogEntry::new(event, Severity::Info).with_root(root));
                Ok(())
            }
            Err(err) => {
                if matches!(err, MstError::Locked { .. }) {
                    self.log.record(
                        &LogEntry::new(EventType::LockConflict, Severity::Warning)
                            .with_root(root)
                            .with_error(&err),
                    );
                }
                Err(err)
            }
        }
    }

    // ──────────────────── logging helpers ────────────────────

    fn log_outcome<T>(
        &self,
        event: EventType,
        root: &Path,
        result: &Result<T>,
        started: Instant,
        decorate: impl FnOnce(&T, &mut LogEntry),
    ) {
        let mut entry = match result {
            Ok(_) => LogEntry::new(event, Severity::Info),
            Err(err) => LogEntry::new(event, Severity::Critical).with_error(err),
        }
        .with_root(root);
        entry.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        if let Ok(value) = result {
            entry.ok = Some(true);
            decorate(value, &mut entry);
        }
        self.log.record(&entry);
    }

    fn log_recovery(&self, root: &Path, bundle: &MissionBundle, report: &RecoveryReport) {
        let mission_id = Some(bundle.document.mission_id.clone());
        if report.source == RecoverySource::WalNewer || report.source == RecoverySource::WalOnly {
            let mut entry =
                LogEntry::new(EventType::WalRecovered, Severity::Warning).with_root(root);
            entry.mission_id = mission_id.clone();
            self.log.record(&entry);
        }
        if report.stale_wal_removed {
            let mut entry = LogEntry::new(EventType::WalDiscarded, Severity::Info).with_root(root);
            entry.mission_id = mission_id.clone();
            self.log.record(&entry);
        }
        if report.backup_repaired {
            let mut entry = LogEntry::new(EventType::BackupRepair, Severity::Info).with_root(root);
            entry.mission_id = mission_id;
            self.log.record(&entry);
        }
    }
}
