//! Editing session: debounce timers and the save worker thread.
//!
//! One session per open mission root. UI-side code calls
//! [`MissionSession::note_edit`] with a fresh bundle snapshot on every edit;
//! the worker collapses bursts into a single WAL stage (~250 ms after the
//! last edit) followed by a single checkpoint (~900 ms after the last
//! edit). All pending timers live inside the worker, so teardown cancels
//! everything by shutting down one owner.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::errors::{MstError, Result};
use crate::logger::{EventType, LogEntry, Severity};
use crate::model::bundle::MissionBundle;
use crate::recorder::TrackRecorder;
use crate::store::repository::Repository;

/// Commands from the owning side to the worker.
enum Command {
    /// A new bundle snapshot replaces any pending one; both timers restart.
    NoteEdit(Box<MissionBundle>),
    /// Flush the pending state durably right now.
    SaveNow,
    /// Final save, lock release, exit.
    Shutdown,
}

/// Handle to one mission's save worker.
pub struct MissionSession {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl MissionSession {
    /// Spawn the worker for an opened (or freshly created) mission.
    ///
    /// The session takes the bundle as its last durable state; it does not
    /// re-save it until an edit arrives.
    pub fn spawn(repository: Arc<Repository>, bundle: MissionBundle) -> Result<Self> {
        let (tx, rx) = bounded(64);
        let handle = thread::Builder::new()
            .name(format!("mission-save-{}", bundle.document.mission_id))
            .spawn(move || worker_loop(&repository, bundle, &rx))
            .map_err(|e| MstError::Runtime {
                details: format!("failed to spawn save worker: {e}"),
            })?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Register an edit. The bundle snapshot replaces any pending one.
    pub fn note_edit(&self, bundle: MissionBundle) -> Result<()> {
        self.tx
            .send(Command::NoteEdit(Box::new(bundle)))
            .map_err(|_| MstError::ChannelClosed {
                component: "save worker",
            })
    }

    /// Skip the debounce and commit the pending state now.
    pub fn save_now(&self) -> Result<()> {
        self.tx
            .send(Command::SaveNow)
            .map_err(|_| MstError::ChannelClosed {
                component: "save worker",
            })
    }

    /// Close active tracks, final save, lock release, worker join.
    /// Best-effort: persistence failures during teardown are logged, not
    /// surfaced.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MissionSession {
    fn drop(&mut self) {
        // shutdown() leaves handle == None; this path covers callers that
        // just drop the session.
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ──────────────────── worker ────────────────────

struct WorkerState {
    /// Last bundle handed to us; always the newest edit wins.
    bundle: MissionBundle,
    stage_deadline: Option<Instant>,
    checkpoint_deadline: Option<Instant>,
}

impl WorkerState {
    fn nearest_deadline(&self) -> Option<Instant> {
        match (self.stage_deadline, self.checkpoint_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn dirty(&self) -> bool {
        self.stage_deadline.is_some() || self.checkpoint_deadline.is_some()
    }
}

fn worker_loop(repository: &Repository, bundle: MissionBundle, rx: &Receiver<Command>) {
    let durability = &repository.config().durability;
    let stage_delay = Duration::from_millis(durability.stage_debounce_ms);
    let checkpoint_delay = Duration::from_millis(durability.checkpoint_debounce_ms);

    let mut state = WorkerState {
        bundle,
        stage_deadline: None,
        checkpoint_deadline: None,
    };

    loop {
        let command = match state.nearest_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        match command {
            Some(Command::NoteEdit(fresh)) => {
                let now = Instant::now();
                state.bundle = *fresh;
                state.stage_deadline = Some(now + stage_delay);
                state.checkpoint_deadline = Some(now + checkpoint_delay);
            }
            Some(Command::SaveNow) => {
                let _ = repository.save_mission(&mut state.bundle);
                state.stage_deadline = None;
                state.checkpoint_deadline = None;
            }
            Some(Command::Shutdown) => break,
            None => fire_due_timers(repository, &mut state),
        }
    }

    teardown(repository, &mut state);
}

fn fire_due_timers(repository: &Repository, state: &mut WorkerState) {
    let now = Instant::now();
    if state.stage_deadline.is_some_and(|d| d <= now) {
        state.stage_deadline = None;
        // A failed stage is retried implicitly by the checkpoint timer,
        // which rewrites everything anyway.
        let _ = repository.stage_mission(&mut state.bundle);
    }
    if state.checkpoint_deadline.is_some_and(|d| d <= now) {
        state.checkpoint_deadline = None;
        let _ = repository.checkpoint_mission(&state.bundle);
    }
}

/// Last-gasp flush: close every active track, commit whatever is pending,
/// release the lock, flush the activity log. Every failure here is
/// swallowed — the WAL already holds the data if the checkpoint fails.
fn teardown(repository: &Repository, state: &mut WorkerState) {
    let root = state.bundle.root.clone();
    let tracks_open = !state.bundle.document.active_tracks.is_empty();
    if tracks_open {
        let mut recorder = TrackRecorder::from_bundle(&state.bundle);
        recorder.stop_all();
        recorder.apply_to(&mut state.bundle);
    }
    if state.dirty() || tracks_open {
        let _ = repository.save_mission(&mut state.bundle);
    }
    let _ = repository.release_lock(&root);
    repository.activity_log().record(
        &LogEntry::new(EventType::TeardownFlush, Severity::Info).with_root(&root),
    );
    repository.activity_log().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::paths::MissionLayout;
    use crate::model::document::MissionKind;
    use crate::storage::backend::StorageBackend;
    use crate::storage::memory::MemoryBackend;
    use std::path::Path;

    // Short debounce so the tests stay fast; the stage/checkpoint ratio
    // mirrors the production defaults.
    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.durability.stage_debounce_ms = 40;
        config.durability.checkpoint_debounce_ms = 140;
        config
    }

    fn setup(root: &Path) -> (MemoryBackend, Arc<Repository>, MissionBundle) {
        let backend = MemoryBackend::new();
        let repository = Arc::new(Repository::without_log(backend.shared(), test_config()));
        let bundle = repository
            .create_mission(
                root,
                MissionKind::Named {
                    name: "Dive-01".to_string(),
                },
            )
            .unwrap();
        (backend, repository, bundle)
    }

    fn edited(bundle: &MissionBundle, note: &str) -> MissionBundle {
        let mut fresh = bundle.clone();
        fresh.markers.features.push(serde_json::json!({
            "type": "Feature",
            "properties": { "name": note },
            "geometry": { "type": "Point", "coordinates": [30.3, 59.9] }
        }));
        fresh
    }

    fn wal_writes(backend: &MemoryBackend, root: &Path) -> usize {
        let wal = MissionLayout::new(root).wal();
        backend.write_log().iter().filter(|p| **p == wal).count()
    }

    #[test]
    fn edit_burst_collapses_into_one_stage_and_one_checkpoint() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let doc_path = MissionLayout::new(root).document();
        let doc_writes_before = backend
            .write_log()
            .iter()
            .filter(|p| **p == doc_path)
            .count();

        let session = MissionSession::spawn(repository, bundle.clone()).unwrap();
        for i in 0..5 {
            session.note_edit(edited(&bundle, &format!("wp-{i}"))).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(400));

        assert_eq!(wal_writes(&backend, root), 1);
        let doc_writes_after = backend
            .write_log()
            .iter()
            .filter(|p| **p == doc_path)
            .count();
        assert_eq!(doc_writes_after - doc_writes_before, 1);

        // Checkpoint consumed the WAL.
        assert!(!backend.exists(&MissionLayout::new(root).wal()));
        session.shutdown();
    }

    #[test]
    fn stage_lands_before_the_checkpoint() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let session = MissionSession::spawn(repository, bundle.clone()).unwrap();

        session.note_edit(edited(&bundle, "wp-1")).unwrap();
        thread::sleep(Duration::from_millis(80));
        // Stage fired, checkpoint still pending.
        assert!(backend.exists(&MissionLayout::new(root).wal()));

        thread::sleep(Duration::from_millis(200));
        assert!(!backend.exists(&MissionLayout::new(root).wal()));
        session.shutdown();
    }

    #[test]
    fn staged_edit_is_durable() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let session = MissionSession::spawn(Arc::clone(&repository), bundle.clone()).unwrap();

        session.note_edit(edited(&bundle, "wp-1")).unwrap();
        thread::sleep(Duration::from_millis(400));
        session.shutdown();

        let stored = backend
            .contents(&MissionLayout::new(root).document())
            .unwrap();
        assert!(stored.contains("updated_at"));
        let markers = backend
            .contents(&MissionLayout::new(root).resolve("markers/markers.geojson"))
            .unwrap();
        assert!(markers.contains("wp-1"));
    }

    #[test]
    fn shutdown_flushes_pending_edits_and_releases_the_lock() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let session = MissionSession::spawn(Arc::clone(&repository), bundle.clone()).unwrap();

        // Shut down well inside the debounce window.
        session.note_edit(edited(&bundle, "last-second")).unwrap();
        session.shutdown();

        let markers = backend
            .contents(&MissionLayout::new(root).resolve("markers/markers.geojson"))
            .unwrap();
        assert!(markers.contains("last-second"));
        assert!(!repository.has_lock(root));
    }

    #[test]
    fn save_now_skips_the_debounce() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let session = MissionSession::spawn(repository, bundle.clone()).unwrap();

        session.note_edit(edited(&bundle, "urgent")).unwrap();
        session.save_now().unwrap();
        thread::sleep(Duration::from_millis(20));

        let markers = backend
            .contents(&MissionLayout::new(root).resolve("markers/markers.geojson"))
            .unwrap();
        assert!(markers.contains("urgent"));
        session.shutdown();
    }

    #[test]
    fn clean_shutdown_without_edits_only_releases_the_lock() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        let writes_before = backend.write_log().len();

        let session = MissionSession::spawn(Arc::clone(&repository), bundle).unwrap();
        session.shutdown();

        // No save happened; only the lock marker was removed.
        assert_eq!(backend.write_log().len(), writes_before);
        assert!(!repository.has_lock(root));
    }

    #[test]
    fn shutdown_closes_active_tracks_in_the_stored_document() {
        let root = Path::new("/m/dive-01");
        let (_, repository, bundle) = setup(root);

        // A live recording at shutdown time.
        let mut recorder = TrackRecorder::from_bundle(&bundle);
        recorder.start("diver-1");
        recorder.fix_received("diver-1", &crate::model::track::Fix {
            entity_id: "diver-1".to_string(),
            ts: "2026-03-01T10:00:00.000Z".to_string(),
            lat: 59.934,
            lon: 30.335,
            speed: None,
            course: None,
            depth: None,
        });
        let mut live = bundle.clone();
        recorder.apply_to(&mut live);

        let session = MissionSession::spawn(Arc::clone(&repository), live).unwrap();
        session.shutdown();

        let reopened = repository
            .open_mission(root, crate::store::repository::OpenOptions::default())
            .unwrap();
        assert!(reopened.document.active_tracks.is_empty());
        let meta = reopened.document.track("diver-1-track-0001").unwrap();
        assert!(meta.ended_at.is_some());
        assert_eq!(reopened.points_of("diver-1-track-0001").len(), 1);
    }

    #[test]
    fn drop_behaves_like_shutdown() {
        let root = Path::new("/m/dive-01");
        let (backend, repository, bundle) = setup(root);
        {
            let session = MissionSession::spawn(Arc::clone(&repository), bundle.clone()).unwrap();
            session.note_edit(edited(&bundle, "dropped")).unwrap();
        }
        let markers = backend
            .contents(&MissionLayout::new(root).resolve("markers/markers.geojson"))
            .unwrap();
        assert!(markers.contains("dropped"));
        assert!(!repository.has_lock(root));
    }
}
