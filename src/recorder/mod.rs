//! Per-agent track recording state machine.
//!
//! Pure state: every event is `(state, event) → state` with no I/O, so the
//! whole lifecycle is deterministically unit-testable. The recorder owns
//! the mission document and the per-track point lists; the session merges
//! its output back into a bundle and hands that to the repository.
//!
//! One deliberate quirk, preserved from observed product behavior: `pause`
//! closes the active track exactly like `stop`, so `resume` allocates a
//! brand-new track file rather than continuing the old one.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::core::paths::{track_csv_rel, track_index_from_rel};
use crate::model::bundle::MissionBundle;
use crate::model::document::{MissionDocument, TrackMeta, now_rfc3339};
use crate::model::track::{Fix, TrackPoint};

/// Recording status of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingStatus {
    Recording,
    Paused,
    #[default]
    Stopped,
}

/// The recorder: shared document plus per-agent recording state.
#[derive(Debug, Clone)]
pub struct TrackRecorder {
    document: MissionDocument,
    points: BTreeMap<String, Vec<TrackPoint>>,
    statuses: BTreeMap<String, RecordingStatus>,
    /// Current segment id per active track.
    segments: BTreeMap<String, u32>,
}

impl TrackRecorder {
    /// Rebuild full state from persisted data.
    ///
    /// Without an explicit status map, every agent present in
    /// `active_tracks` is considered `Recording` and everyone else
    /// `Stopped`. The current segment of each active track is derived from
    /// its last persisted point.
    pub fn hydrate(
        document: MissionDocument,
        points: BTreeMap<String, Vec<TrackPoint>>,
        statuses: Option<BTreeMap<String, RecordingStatus>>,
    ) -> Self {
        let statuses = statuses.unwrap_or_else(|| {
            document
                .active_tracks
                .keys()
                .map(|agent| (agent.clone(), RecordingStatus::Recording))
                .collect()
        });
        let segments = document
            .active_tracks
            .values()
            .map(|track_id| {
                let current = points
                    .get(track_id)
                    .and_then(|list| list.last())
                    .map_or(1, |p| p.segment_id);
                (track_id.clone(), current)
            })
            .collect();
        Self {
            document,
            points,
            statuses,
            segments,
        }
    }

    /// Recorder over a bundle's document and points.
    pub fn from_bundle(bundle: &MissionBundle) -> Self {
        Self::hydrate(bundle.document.clone(), bundle.tracks.clone(), None)
    }

    /// Write the recorder's document and points back into a bundle.
    pub fn apply_to(&self, bundle: &mut MissionBundle) {
        bundle.document = self.document.clone();
        bundle.tracks = self.points.clone();
    }

    pub fn document(&self) -> &MissionDocument {
        &self.document
    }

    pub fn points_of(&self, track_id: &str) -> &[TrackPoint] {
        self.points.get(track_id).map_or(&[], Vec::as_slice)
    }

    pub fn status_of(&self, agent_id: &str) -> RecordingStatus {
        self.statuses.get(agent_id).copied().unwrap_or_default()
    }

    // ──────────────────── events ────────────────────

    /// Begin (or continue) recording for an agent. Allocates a new track
    /// when the agent has no active one.
    pub fn start(&mut self, agent_id: &str) {
        if self.document.active_track_of(agent_id).is_none() {
            self.allocate_track(agent_id);
        }
        self.statuses
            .insert(agent_id.to_string(), RecordingStatus::Recording);
    }

    /// Same transition as [`Self::start`]; kept as a separate event because
    /// callers mean something different by it after a `pause`.
    pub fn resume(&mut self, agent_id: &str) {
        self.start(agent_id);
    }

    /// Pause recording. Closes the active track (see module docs).
    pub fn pause(&mut self, agent_id: &str) {
        self.close_active_track(agent_id);
        self.statuses
            .insert(agent_id.to_string(), RecordingStatus::Paused);
    }

    /// Stop recording and close the active track.
    pub fn stop(&mut self, agent_id: &str) {
        self.close_active_track(agent_id);
        self.statuses
            .insert(agent_id.to_string(), RecordingStatus::Stopped);
    }

    /// Close every agent's active track and set every status to stopped.
    pub fn stop_all(&mut self) {
        let agents: Vec<String> = self
            .statuses
            .keys()
            .chain(self.document.active_tracks.keys())
            .cloned()
            .collect();
        for agent in agents {
            self.stop(&agent);
        }
    }

    /// Append a telemetry fix to the agent's active track.
    ///
    /// Dropped unless the agent is actively recording; also dropped when
    /// the fix carries a non-finite position.
    pub fn fix_received(&mut self, agent_id: &str, fix: &Fix) {
        if self.status_of(agent_id) != RecordingStatus::Recording {
            return;
        }
        let Some(track_id) = self.document.active_track_of(agent_id).map(str::to_string) else {
            return;
        };
        let segment_id = self.segments.get(&track_id).copied().unwrap_or(1);
        let point = fix.to_point(segment_id);
        if !point.has_finite_position() {
            return;
        }
        self.points.entry(track_id).or_default().push(point);
    }

    /// The telemetry link came back after a gap: subsequent points start a
    /// new segment within the same track.
    pub fn connection_restored(&mut self, agent_id: &str) {
        if self.status_of(agent_id) != RecordingStatus::Recording {
            return;
        }
        if let Some(track_id) = self.document.active_track_of(agent_id).map(str::to_string)
            && let Some(segment) = self.segments.get_mut(&track_id)
        {
            *segment += 1;
        }
    }

    /// Remove a track's points and metadata. If it was some agent's active
    /// track, that agent is forced to `Stopped`. Returns whether the track
    /// existed.
    pub fn delete_track(&mut self, track_id: &str) -> bool {
        let existed = self.document.track(track_id).is_some();
        self.document.tracks.retain(|t| t.id != track_id);
        self.points.remove(track_id);
        self.segments.remove(track_id);

        let owners: Vec<String> = self
            .document
            .active_tracks
            .iter()
            .filter(|(_, id)| id.as_str() == track_id)
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in owners {
            self.document.active_tracks.remove(&agent);
            self.statuses.insert(agent, RecordingStatus::Stopped);
        }
        existed
    }

    // ──────────────────── internal ────────────────────

    fn allocate_track(&mut self, agent_id: &str) {
        let index = self.next_track_index(agent_id);
        let file = track_csv_rel(agent_id, index);
        // Track id is the CSV file stem: stable, human-readable, unique per
        // agent within one mission.
        let id = file
            .trim_start_matches("tracks/")
            .trim_end_matches(".csv")
            .to_string();

        self.document.tracks.push(TrackMeta {
            id: id.clone(),
            agent_id: Some(agent_id.to_string()),
            file,
            started_at: now_rfc3339(),
            ended_at: None,
            note: String::new(),
        });
        self.document
            .active_tracks
            .insert(agent_id.to_string(), id.clone());
        self.points.insert(id.clone(), Vec::new());
        self.segments.insert(id, 1);
    }

    fn next_track_index(&self, agent_id: &str) -> u32 {
        self.document
            .tracks
            .iter()
            .filter(|t| t.agent_id.as_deref() == Some(agent_id))
            .filter_map(|t| track_index_from_rel(&t.file))
            .max()
            .map_or(1, |n| n + 1)
    }

    fn close_active_track(&mut self, agent_id: &str) {
        let Some(track_id) = self.document.active_tracks.remove(agent_id) else {
            return;
        };
        self.segments.remove(&track_id);
        if let Some(meta) = self.document.track_mut(&track_id)
            && meta.ended_at.is_none()
        {
            meta.ended_at = Some(now_rfc3339());
        }
    }
}
