//! The mission document: identity, track roster, file pointers.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::errors::{MstError, Result, SnapshotSource};
use crate::core::paths::{MARKERS_REL, ROUTES_REL};

/// Document schema version this engine reads and writes.
///
/// Checked for exact equality on load; there is no silent up/down migration.
pub const DOCUMENT_SCHEMA_VERSION: u32 = 3;

/// Draft scratch space vs. a committed, named mission.
///
/// Serialized tagged so the document stays self-describing:
/// `{"kind": "draft"}` or `{"kind": "named", "name": "Dive-01"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissionKind {
    Draft,
    Named { name: String },
}

impl MissionKind {
    /// Display name: the mission's name, or "Draft" for scratch space.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Draft => "Draft",
            Self::Named { name } => name,
        }
    }

    #[must_use]
    pub const fn is_draft(&self) -> bool {
        matches!(self, Self::Draft)
    }
}

/// Metadata for one recorded track. The points themselves live in the
/// track's CSV file (and in [`crate::model::bundle::MissionBundle::tracks`]
/// while in memory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: String,
    /// Agent that recorded this track; `None` for imported tracks.
    pub agent_id: Option<String>,
    /// CSV path relative to the mission root.
    pub file: String,
    pub started_at: String,
    /// Stamped once when the track is closed; a second close is a no-op.
    pub ended_at: Option<String>,
    #[serde(default)]
    pub note: String,
}

/// Relative paths of the geometry collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFiles {
    pub routes: String,
    pub markers: String,
}

impl Default for DocumentFiles {
    fn default() -> Self {
        Self {
            routes: ROUTES_REL.to_string(),
            markers: MARKERS_REL.to_string(),
        }
    }
}

/// The persisted mission document (`mission.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDocument {
    pub schema_version: u32,
    pub mission_id: String,
    #[serde(flatten)]
    pub kind: MissionKind,
    pub created_at: String,
    pub updated_at: String,
    /// agent-id → track-id for agents with a live track.
    #[serde(default)]
    pub active_tracks: BTreeMap<String, String>,
    /// Ordered track roster.
    #[serde(default)]
    pub tracks: Vec<TrackMeta>,
    pub files: DocumentFiles,
}

impl MissionDocument {
    /// Fresh document stamped with the current time and a new mission id.
    #[must_use]
    pub fn new(kind: MissionKind) -> Self {
        let now = now_rfc3339();
        Self {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            mission_id: new_mission_id(),
            kind,
            created_at: now.clone(),
            updated_at: now,
            active_tracks: BTreeMap::new(),
            tracks: Vec::new(),
            files: DocumentFiles::default(),
        }
    }

    /// Exact schema check; the error names the mismatch direction.
    pub fn check_schema(&self) -> Result<()> {
        check_schema_version(self.schema_version, DOCUMENT_SCHEMA_VERSION, SnapshotSource::Document)
    }

    /// Structural invariants: every active track resolves to a roster entry,
    /// and the geometry file pointers are non-empty relative paths.
    pub fn validate(&self) -> Result<()> {
        for (agent, track_id) in &self.active_tracks {
            if self.track(track_id).is_none() {
                return Err(MstError::InvalidDocument {
                    details: format!(
                        "active_tracks[{agent}] references unknown track id {track_id:?}"
                    ),
                });
            }
        }
        for (label, rel) in [("routes", &self.files.routes), ("markers", &self.files.markers)] {
            if rel.is_empty() {
                return Err(MstError::InvalidDocument {
                    details: format!("files.{label} must be a non-empty relative path"),
                });
            }
            if rel.starts_with('/') {
                return Err(MstError::InvalidDocument {
                    details: format!("files.{label} must be relative, got {rel:?}"),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn track(&self, track_id: &str) -> Option<&TrackMeta> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: &str) -> Option<&mut TrackMeta> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    /// The active track id for an agent, if it has one.
    #[must_use]
    pub fn active_track_of(&self, agent_id: &str) -> Option<&str> {
        self.active_tracks.get(agent_id).map(String::as_str)
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

/// Exact-equality schema gate shared by the document and the WAL snapshot.
pub fn check_schema_version(found: u32, supported: u32, kind: SnapshotSource) -> Result<()> {
    if found == supported {
        Ok(())
    } else {
        Err(MstError::SchemaMismatch {
            kind,
            found,
            supported,
        })
    }
}

/// Current UTC time as RFC 3339 with millisecond precision and a `Z` suffix.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a stored timestamp for comparison. `None` when unparseable.
#[must_use]
pub fn parse_rfc3339(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// New mission id: millisecond epoch plus a random suffix, e.g.
/// `m-1823094055123-k7qz`. Sortable by creation time, unique enough for the
/// single-writer model.
#[must_use]
pub fn new_mission_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::rng();
    let suffix: String = (0..4)
        .map(|_| {
            let idx = rng.random_range(0..36u32);
            char::from_digit(idx, 36).unwrap_or('0')
        })
        .collect();
    format!("m-{millis}-{suffix}")
}
