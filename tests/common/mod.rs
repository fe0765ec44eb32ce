//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use mission_store::prelude::*;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Engine config with the activity log disabled so tests never write
/// outside their temp directories.
pub fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.activity_log.enabled = false;
    config
}

/// Repository over the real filesystem.
pub fn fs_repository() -> Arc<Repository> {
    Arc::new(Repository::new(StdFsBackend::shared(), quiet_config()))
}

pub fn named(name: &str) -> MissionKind {
    MissionKind::Named {
        name: name.to_string(),
    }
}

pub fn fix(agent: &str, ts: &str, lat: f64, lon: f64) -> Fix {
    Fix {
        entity_id: agent.to_string(),
        ts: ts.to_string(),
        lat,
        lon,
        speed: None,
        course: None,
        depth: None,
    }
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_mstore") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "mstore.exe" } else { "mstore" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve mstore binary path for integration test"),
    }
}

pub fn run_cli(args: &[&str]) -> CmdResult {
    let output = Command::new(resolve_bin_path())
        .args(args)
        .env("MST_OUTPUT_FORMAT", "json")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute mstore command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
