//! Activity logging for the persistence engine.
//!
//! [`ActivityLog`] is the shared handle the repository and session write
//! through; internally it is the JSONL writer behind a mutex. A disabled
//! log drops entries without any I/O, so tests stay quiet by default.

pub mod jsonl;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::ActivityLogConfig;
pub use jsonl::{EventType, JsonlWriter, LogEntry, Severity};

/// Shared, cheaply clonable handle to the activity log.
#[derive(Clone, Default)]
pub struct ActivityLog {
    inner: Option<Arc<Mutex<JsonlWriter>>>,
}

impl ActivityLog {
    /// Open per the config; a disabled config yields a no-op log.
    #[must_use]
    pub fn from_config(config: &ActivityLogConfig) -> Self {
        if config.enabled {
            Self {
                inner: Some(Arc::new(Mutex::new(JsonlWriter::open(config.clone())))),
            }
        } else {
            Self::disabled()
        }
    }

    /// No-op log.
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Record one entry. Never fails; logging must not fail store operations.
    pub fn record(&self, entry: &LogEntry) {
        if let Some(writer) = &self.inner {
            writer.lock().write_entry(entry);
        }
    }

    /// Flush buffered lines.
    pub fn flush(&self) {
        if let Some(writer) = &self.inner {
            writer.lock().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn disabled_log_is_a_no_op() {
        let log = ActivityLog::disabled();
        log.record(&LogEntry::new(EventType::MissionOpen, Severity::Info));
        log.flush();
    }

    #[test]
    fn enabled_log_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = ActivityLogConfig {
            enabled: true,
            path: dir.path().join("activity.jsonl"),
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 2,
            fsync_interval_secs: 60,
        };
        let log = ActivityLog::from_config(&config);
        log.record(
            &LogEntry::new(EventType::Checkpoint, Severity::Info).with_root(Path::new("/m")),
        );
        log.flush();

        let text = std::fs::read_to_string(dir.path().join("activity.jsonl")).unwrap();
        assert!(text.contains("checkpoint"));
    }

    #[test]
    fn disabled_config_yields_no_op() {
        let config = ActivityLogConfig {
            enabled: false,
            ..ActivityLogConfig::default()
        };
        let log = ActivityLog::from_config(&config);
        log.record(&LogEntry::new(EventType::WalStage, Severity::Info));
    }
}
