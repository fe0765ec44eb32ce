//! Data model: the mission document, track points, and the bundle that ties
//! one mission root's state together.

pub mod bundle;
pub mod document;
pub mod track;

pub use bundle::{FeatureCollection, MissionBundle, WalSnapshot, WAL_SCHEMA_VERSION};
pub use document::{
    DOCUMENT_SCHEMA_VERSION, DocumentFiles, MissionDocument, MissionKind, TrackMeta,
};
pub use track::{Fix, TrackPoint};
