//! On-disk layout of a mission root.
//!
//! Every path under a mission root is derived here so the writer, the
//! reconciler, and the CLI agree byte-for-byte on where things live:
//!
//! ```text
//! <root>/mission.json            primary document
//! <root>/mission.json.bak        backup document (always written first)
//! <root>/routes/routes.geojson   routes feature collection
//! <root>/markers/markers.geojson markers feature collection
//! <root>/tracks/<agent>-track-NNNN.csv
//! <root>/logs/wal/current.wal    single WAL snapshot file
//! <root>/mission.lock            advisory lock marker
//! ```

use std::path::{Path, PathBuf};

/// Primary mission document, relative to the root.
pub const DOCUMENT_REL: &str = "mission.json";
/// Backup mission document, relative to the root.
pub const DOCUMENT_BAK_REL: &str = "mission.json.bak";
/// Default routes collection, relative to the root.
pub const ROUTES_REL: &str = "routes/routes.geojson";
/// Default markers collection, relative to the root.
pub const MARKERS_REL: &str = "markers/markers.geojson";
/// WAL snapshot file, relative to the root.
pub const WAL_REL: &str = "logs/wal/current.wal";
/// Lock marker, relative to the root.
pub const LOCK_REL: &str = "mission.lock";
/// Directory holding per-track CSV files, relative to the root.
pub const TRACKS_DIR_REL: &str = "tracks";

/// Absolute-path view of one mission root's layout.
#[derive(Debug, Clone)]
pub struct MissionLayout {
    root: PathBuf,
}

impl MissionLayout {
    /// Layout rooted at `root` (not required to exist yet).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document(&self) -> PathBuf {
        self.root.join(DOCUMENT_REL)
    }

    pub fn document_backup(&self) -> PathBuf {
        self.root.join(DOCUMENT_BAK_REL)
    }

    pub fn wal(&self) -> PathBuf {
        self.root.join(WAL_REL)
    }

    pub fn lock_marker(&self) -> PathBuf {
        self.root.join(LOCK_REL)
    }

    /// Resolve a document-relative path (e.g. `files.routes` or a track's
    /// CSV path) against the root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Root-relative CSV path for a track, e.g. `tracks/diver-1-track-0003.csv`.
///
/// The agent id is sanitized to a filesystem-safe prefix; `index` is a
/// per-agent running counter starting at 1.
pub fn track_csv_rel(agent_id: &str, index: u32) -> String {
    format!("{TRACKS_DIR_REL}/{}-track-{index:04}.csv", sanitize(agent_id))
}

/// Per-agent counter parsed back out of a track CSV path, if it matches the
/// `…-track-NNNN.csv` shape. Used when hydrating to continue numbering.
///
/// Indices past 9999 overflow the four-digit padding, so anything with
/// four or more digits is accepted.
pub fn track_index_from_rel(rel: &str) -> Option<u32> {
    let stem = rel.strip_suffix(".csv")?;
    let (_, digits) = stem.rsplit_once("-track-")?;
    if digits.len() >= 4 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn sanitize(agent_id: &str) -> String {
    let cleaned: String = agent_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "agent".to_string()
    } else {
        cleaned
    }
}
