//! The in-memory unit of persistence: one mission root's complete state.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{Result, SnapshotSource};
use crate::model::document::{MissionDocument, check_schema_version};
use crate::model::track::TrackPoint;

/// WAL snapshot schema version, independent of the document schema.
pub const WAL_SCHEMA_VERSION: u32 = 1;

/// Opaque GeoJSON feature collection.
///
/// The engine stores and merges features without interpreting their
/// geometry; unknown top-level keys survive a round-trip via `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub collection_type: String,
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self {
            collection_type: "FeatureCollection".to_string(),
            features: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl FeatureCollection {
    /// Merge lane-generator output for one survey area.
    ///
    /// Features previously generated for `parent_area_id` (matched on
    /// `properties.parent_area_id`) are dropped, then the new set is
    /// appended. Geometry is never inspected.
    pub fn merge_generated(&mut self, parent_area_id: &str, generated: Vec<Value>) {
        self.features.retain(|f| {
            f.pointer("/properties/parent_area_id")
                .and_then(Value::as_str)
                != Some(parent_area_id)
        });
        self.features.extend(generated);
    }
}

/// The full addressable state of one mission root. Every write operation
/// takes and emits a whole bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionBundle {
    pub root: PathBuf,
    pub document: MissionDocument,
    pub routes: FeatureCollection,
    pub markers: FeatureCollection,
    /// track-id → points, insertion order preserved per track.
    pub tracks: BTreeMap<String, Vec<TrackPoint>>,
}

impl MissionBundle {
    /// Empty bundle around a fresh document.
    #[must_use]
    pub fn new(root: PathBuf, document: MissionDocument) -> Self {
        Self {
            root,
            document,
            routes: FeatureCollection::default(),
            markers: FeatureCollection::default(),
            tracks: BTreeMap::new(),
        }
    }

    /// Points recorded for a track (empty slice when none).
    #[must_use]
    pub fn points_of(&self, track_id: &str) -> &[TrackPoint] {
        self.tracks.get(track_id).map_or(&[], Vec::as_slice)
    }
}

/// Self-contained WAL copy of a bundle: "the most recent change, not yet
/// durably checkpointed". Stored as one JSON file separate from the
/// checkpoint files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalSnapshot {
    pub wal_schema_version: u32,
    pub document: MissionDocument,
    pub routes: FeatureCollection,
    pub markers: FeatureCollection,
    pub tracks: BTreeMap<String, Vec<TrackPoint>>,
}

impl WalSnapshot {
    /// Snapshot the given bundle at the current WAL schema.
    #[must_use]
    pub fn of(bundle: &MissionBundle) -> Self {
        Self {
            wal_schema_version: WAL_SCHEMA_VERSION,
            document: bundle.document.clone(),
            routes: bundle.routes.clone(),
            markers: bundle.markers.clone(),
            tracks: bundle.tracks.clone(),
        }
    }

    /// Exact WAL schema check; the error names the mismatch direction.
    pub fn check_schema(&self) -> Result<()> {
        check_schema_version(self.wal_schema_version, WAL_SCHEMA_VERSION, SnapshotSource::Wal)
    }

    /// Rebuild a bundle rooted at `root` from this snapshot.
    #[must_use]
    pub fn into_bundle(self, root: PathBuf) -> MissionBundle {
        MissionBundle {
            root,
            document: self.document,
            routes: self.routes,
            markers: self.markers,
            tracks: self.tracks,
        }
    }
}
