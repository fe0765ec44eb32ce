//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mission_store::prelude::*;
//! ```

// Core
pub use crate::core::config::EngineConfig;
pub use crate::core::errors::{MstError, Result};
pub use crate::core::paths::MissionLayout;

// Model
pub use crate::model::bundle::{FeatureCollection, MissionBundle, WalSnapshot};
pub use crate::model::document::{MissionDocument, MissionKind, TrackMeta};
pub use crate::model::track::{Fix, TrackPoint};

// Storage
pub use crate::storage::backend::{SharedBackend, StdFsBackend, StorageBackend};
pub use crate::storage::memory::MemoryBackend;

// Store
pub use crate::store::recover::{RecoveryReport, RecoverySource};
pub use crate::store::repository::{OpenOptions, Repository};

// Recorder and session
pub use crate::recorder::{RecordingStatus, TrackRecorder};
pub use crate::session::MissionSession;

// Logging
pub use crate::logger::{ActivityLog, EventType, LogEntry, Severity};
