//! MST-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MstError>;

/// Which persisted snapshot a schema check was performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Document,
    Wal,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Wal => write!(f, "WAL"),
        }
    }
}

/// Top-level error type for the mission store.
#[derive(Debug, Error)]
pub enum MstError {
    #[error("[MST-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MST-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error(
        "[MST-1101] {kind} schema version {found} is {} than supported version {supported}",
        if .found > .supported { "newer" } else { "older" }
    )]
    SchemaMismatch {
        kind: SnapshotSource,
        found: u32,
        supported: u32,
    },

    #[error("[MST-2001] invalid mission document: {details}")]
    InvalidDocument { details: String },

    #[error("[MST-2002] track CSV {path} is missing required header column(s): {missing}")]
    CsvHeader { path: PathBuf, missing: String },

    #[error("[MST-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MST-3001] mission root is locked by another writer: {root}")]
    Locked { root: PathBuf },

    #[error("[MST-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MST-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error(
        "[MST-3101] neither mission.json, its backup, nor a WAL snapshot is readable under {root}"
    )]
    NothingToOpen { root: PathBuf },

    #[error("[MST-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MstError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MST-1001",
            Self::ConfigParse { .. } => "MST-1002",
            Self::SchemaMismatch { .. } => "MST-1101",
            Self::InvalidDocument { .. } => "MST-2001",
            Self::CsvHeader { .. } => "MST-2002",
            Self::Serialization { .. } => "MST-2101",
            Self::Locked { .. } => "MST-3001",
            Self::Io { .. } => "MST-3002",
            Self::ChannelClosed { .. } => "MST-3003",
            Self::NothingToOpen { .. } => "MST-3101",
            Self::Runtime { .. } => "MST-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Schema mismatches, validation failures, and missing-header CSVs are
    /// deterministic; retrying them yields the same answer. Lock conflicts
    /// are retryable in the "ask the user to recover the lock" sense.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Locked { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MstError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MstError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
