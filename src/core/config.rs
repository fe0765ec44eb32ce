//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MstError, Result};

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct EngineConfig {
    pub durability: DurabilityConfig,
    pub lock: LockConfig,
    pub activity_log: ActivityLogConfig,
}

/// Debounce windows for the two write paths.
///
/// Each edit reschedules both timers, so a burst of edits collapses into one
/// WAL stage and one checkpoint. The stage window must stay below the
/// checkpoint window or the WAL stops bounding data loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DurabilityConfig {
    /// Delay after an edit before the WAL snapshot is staged.
    pub stage_debounce_ms: u64,
    /// Delay after an edit before a full checkpoint is written.
    pub checkpoint_debounce_ms: u64,
}

/// Lock marker behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    /// Owner tag recorded in `mission.lock` (shown to the user on conflict).
    pub owner_tag: String,
}

/// Activity JSONL log destination and rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActivityLogConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            stage_debounce_ms: 250,
            checkpoint_debounce_ms: 900,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        let host = env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            owner_tag: format!("mission_store@{host}:{}", std::process::id()),
        }
    }
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        let data = home_dir.join(".local").join("share").join("mission_store");
        Self {
            enabled: true,
            path: data.join("activity.jsonl"),
            fallback_path: None,
            max_size_bytes: 50 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Default configuration path (`~/.config/mission_store/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home_dir
            .join(".config")
            .join("mission_store")
            .join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    /// A missing file at an explicit path is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| MstError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(MstError::InvalidConfig {
                details: format!("missing configuration file: {}", path_buf.display()),
            });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_u64(
            "MST_STAGE_DEBOUNCE_MS",
            &mut self.durability.stage_debounce_ms,
        )?;
        set_env_u64(
            "MST_CHECKPOINT_DEBOUNCE_MS",
            &mut self.durability.checkpoint_debounce_ms,
        )?;
        if let Some(raw) = env_var("MST_LOCK_OWNER_TAG") {
            self.lock.owner_tag = raw;
        }
        set_env_bool("MST_ACTIVITY_LOG_ENABLED", &mut self.activity_log.enabled)?;
        if let Some(raw) = env_var("MST_ACTIVITY_LOG_PATH") {
            self.activity_log.path = PathBuf::from(raw);
        }
        set_env_u64(
            "MST_ACTIVITY_LOG_MAX_SIZE_BYTES",
            &mut self.activity_log.max_size_bytes,
        )?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.durability.stage_debounce_ms == 0 {
            return Err(MstError::InvalidConfig {
                details: "durability.stage_debounce_ms must be > 0".to_string(),
            });
        }
        if self.durability.checkpoint_debounce_ms <= self.durability.stage_debounce_ms {
            return Err(MstError::InvalidConfig {
                details: format!(
                    "durability.checkpoint_debounce_ms ({}) must be > stage_debounce_ms ({})",
                    self.durability.checkpoint_debounce_ms, self.durability.stage_debounce_ms
                ),
            });
        }
        if self.lock.owner_tag.trim().is_empty() {
            return Err(MstError::InvalidConfig {
                details: "lock.owner_tag must not be empty".to_string(),
            });
        }
        if self.activity_log.enabled {
            if self.activity_log.max_size_bytes == 0 {
                return Err(MstError::InvalidConfig {
                    details: "activity_log.max_size_bytes must be > 0".to_string(),
                });
            }
            if self.activity_log.max_rotated_files == 0 {
                return Err(MstError::InvalidConfig {
                    details: "activity_log.max_rotated_files must be >= 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| MstError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| MstError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.durability.stage_debounce_ms, 250);
        assert_eq!(cfg.durability.checkpoint_debounce_ms, 900);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = EngineConfig::default();
        let raw = toml::to_string(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [durability]
            stage_debounce_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(parsed.durability.stage_debounce_ms, 100);
        assert_eq!(parsed.durability.checkpoint_debounce_ms, 900);
        assert!(parsed.activity_log.enabled);
    }

    #[test]
    fn checkpoint_debounce_must_exceed_stage_debounce() {
        let mut cfg = EngineConfig::default();
        cfg.durability.checkpoint_debounce_ms = cfg.durability.stage_debounce_ms;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "MST-1001");
    }

    #[test]
    fn zero_stage_debounce_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.durability.stage_debounce_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent_mst_cfg/config.toml")))
            .unwrap_err();
        assert_eq!(err.code(), "MST-1001");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [lock]
            owner_tag = "bridge-console"
            "#,
        )
        .unwrap();
        let cfg = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.lock.owner_tag, "bridge-console");
    }
}
