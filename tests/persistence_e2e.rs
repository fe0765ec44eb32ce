//! End-to-end persistence scenarios over the real filesystem: WAL recovery
//! after a simulated crash, backup repair, lock conflicts, and the CSV
//! round trip through an actual save/open cycle.

mod common;

use std::thread;
use std::time::Duration;

use mission_store::codec::csv;
use mission_store::prelude::*;
use mission_store::store::recover::Reconciler;

#[test]
fn staged_wal_survives_a_crash_and_wins_the_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");
    let repo = common::fs_repository();

    let mut bundle = repo.create_mission(&root, common::named("Dive-01")).unwrap();

    let mut recorder = TrackRecorder::from_bundle(&bundle);
    recorder.start("diver-1");
    recorder.fix_received(
        "diver-1",
        &common::fix("diver-1", "2026-03-01T10:00:00.000Z", 59.9340, 30.3350),
    );
    recorder.fix_received(
        "diver-1",
        &common::fix("diver-1", "2026-03-01T10:00:05.000Z", 59.9341, 30.3351),
    );
    recorder.apply_to(&mut bundle);

    // Creation and staging can land in the same millisecond; the WAL must
    // carry a strictly newer updated_at to win the reopen.
    thread::sleep(Duration::from_millis(5));
    repo.stage_mission(&mut bundle).unwrap();

    // Crash: no checkpoint, repository simply goes away. The lock marker
    // stays behind.
    let wal_path = MissionLayout::new(&root).wal();
    assert!(wal_path.exists());
    drop(repo);

    // A fresh process confirms the WAL would win before opening.
    let backend = StdFsBackend::shared();
    let (_, report) = Reconciler::new(backend.as_ref()).inspect(&root).unwrap();
    assert_eq!(report.source, RecoverySource::WalNewer);

    let repo = common::fs_repository();
    let reopened = repo
        .open_mission(
            &root,
            OpenOptions {
                acquire_lock: true,
                recover_lock: true,
            },
        )
        .unwrap();

    let track_id = reopened.document.active_track_of("diver-1").unwrap();
    let points = reopened.points_of(track_id);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].lat, 59.9340);
    assert_eq!(points[1].lon, 30.3351);

    // Self-heal: WAL consumed, checkpoint now carries the recovered state.
    assert!(!wal_path.exists());
    let doc_text = std::fs::read_to_string(MissionLayout::new(&root).document()).unwrap();
    assert!(doc_text.contains("diver-1-track-0001"));
    assert!(
        MissionLayout::new(&root)
            .resolve("tracks/diver-1-track-0001.csv")
            .exists()
    );
}

#[test]
fn reopened_updated_at_never_regresses() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");
    let repo = common::fs_repository();

    let mut bundle = repo.create_mission(&root, common::named("Dive-01")).unwrap();
    thread::sleep(Duration::from_millis(5));
    repo.stage_mission(&mut bundle).unwrap();
    let staged_at = bundle.document.updated_at.clone();
    repo.release_lock(&root).unwrap();
    drop(repo);

    let repo = common::fs_repository();
    let reopened = repo.open_mission(&root, OpenOptions::default()).unwrap();
    assert!(reopened.document.updated_at >= staged_at);
}

#[test]
fn open_repairs_primary_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");
    let repo = common::fs_repository();

    let bundle = repo.create_mission(&root, common::named("Dive-01")).unwrap();
    repo.release_lock(&root).unwrap();

    let primary = MissionLayout::new(&root).document();
    std::fs::remove_file(&primary).unwrap();

    let reopened = repo.open_mission(&root, OpenOptions::default()).unwrap();
    assert_eq!(reopened.document.mission_id, bundle.document.mission_id);
    // The repair write restored the primary.
    assert!(primary.exists());
}

#[test]
fn second_writer_is_locked_out_until_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");
    let repo = common::fs_repository();
    repo.create_mission(&root, common::named("Dive-01")).unwrap();

    // Separate repository instance, as another process would have.
    let other = common::fs_repository();
    let err = other
        .open_mission(&root, OpenOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), "MST-3001");

    let recovered = other.open_mission(
        &root,
        OpenOptions {
            acquire_lock: true,
            recover_lock: true,
        },
    );
    assert!(recovered.is_ok());
}

#[test]
fn track_csv_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");
    let repo = common::fs_repository();

    let mut bundle = repo.create_mission(&root, common::named("Dive-01")).unwrap();
    let mut recorder = TrackRecorder::from_bundle(&bundle);
    recorder.start("rov-1");
    let mut deep_fix = common::fix("rov-1", "2026-03-01T10:00:00.123Z", 59.93401234567, 30.3350);
    deep_fix.depth = Some(12.75);
    deep_fix.speed = Some(0.51);
    deep_fix.course = Some(183.2);
    recorder.fix_received("rov-1", &deep_fix);
    recorder.connection_restored("rov-1");
    recorder.fix_received(
        "rov-1",
        &common::fix("rov-1", "2026-03-01T10:01:00.000Z", 59.9341, 30.3351),
    );
    recorder.apply_to(&mut bundle);
    repo.save_mission(&mut bundle).unwrap();

    let csv_path = MissionLayout::new(&root).resolve("tracks/rov-1-track-0001.csv");
    let text = std::fs::read_to_string(&csv_path).unwrap();
    let parsed = csv::parse_csv(&text, &csv_path).unwrap();
    assert_eq!(parsed, bundle.points_of("rov-1-track-0001"));
    assert_eq!(parsed[0].depth_m, Some(12.75));
    assert_eq!(parsed[0].lat, 59.93401234567);
    assert_eq!(parsed[1].segment_id, 2);
}

#[test]
fn draft_promotion_moves_the_mission_between_roots() {
    let dir = tempfile::tempdir().unwrap();
    let draft_root = dir.path().join("draft");
    let dest_root = dir.path().join("dive-02");
    let repo = common::fs_repository();

    let mut draft = repo.create_mission(&draft_root, MissionKind::Draft).unwrap();
    let mut recorder = TrackRecorder::from_bundle(&draft);
    recorder.start("diver-1");
    recorder.fix_received(
        "diver-1",
        &common::fix("diver-1", "2026-03-01T10:00:00.000Z", 59.9340, 30.3350),
    );
    recorder.apply_to(&mut draft);
    repo.save_mission(&mut draft).unwrap();

    let promoted = repo
        .convert_draft_to_mission(&draft_root, &dest_root, "Dive-02")
        .unwrap();
    assert!(!promoted.document.kind.is_draft());
    assert_ne!(promoted.document.mission_id, draft.document.mission_id);

    // The draft root is gone; the named root opens with everything intact.
    assert!(!draft_root.exists());
    repo.release_lock(&dest_root).unwrap();
    let reopened = repo.open_mission(&dest_root, OpenOptions::default()).unwrap();
    assert_eq!(reopened.points_of("diver-1-track-0001").len(), 1);
    assert_eq!(
        reopened.document.active_track_of("diver-1"),
        Some("diver-1-track-0001")
    );
}

#[test]
fn session_persists_debounced_edits_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dive-01");

    let mut config = common::quiet_config();
    config.durability.stage_debounce_ms = 30;
    config.durability.checkpoint_debounce_ms = 90;
    let repo = std::sync::Arc::new(Repository::new(StdFsBackend::shared(), config));

    let bundle = repo.create_mission(&root, common::named("Dive-01")).unwrap();
    let session = MissionSession::spawn(std::sync::Arc::clone(&repo), bundle.clone()).unwrap();

    let mut edited = bundle;
    edited.markers.features.push(serde_json::json!({
        "type": "Feature",
        "properties": { "name": "anchor" },
        "geometry": { "type": "Point", "coordinates": [30.335, 59.934] }
    }));
    session.note_edit(edited).unwrap();
    session.shutdown();

    let reopened = repo.open_mission(&root, OpenOptions::default()).unwrap();
    assert_eq!(reopened.markers.features.len(), 1);
    repo.release_lock(&root).unwrap();
}

#[test]
fn opening_an_empty_directory_reports_nothing_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::fs_repository();
    let err = repo
        .open_mission(&dir.path().join("void"), OpenOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), "MST-3101");
}
