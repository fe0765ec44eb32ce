//! Top-level CLI definition and dispatch.

#![allow(missing_docs)]

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::control;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::model::bundle::MissionBundle;
use crate::storage::backend::{SharedBackend, StdFsBackend};
use crate::store::lock::LockManager;
use crate::store::recover::{Reconciler, RecoveryReport, RecoverySource};

/// Mission Store — durable persistence engine for dive-mission documents.
#[derive(Debug, Parser)]
#[command(
    name = "mstore",
    author,
    version,
    about = "Mission Store - mission document inspection and repair",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Summarize the mission document under a root.
    Inspect(RootArgs),
    /// Dry-run the open-time reconciliation and report which snapshot wins.
    Verify(RootArgs),
    /// List recorded tracks with their point counts.
    Tracks(RootArgs),
    /// Clear a stale lock marker left by a dead process.
    RecoverLock(RootArgs),
}

#[derive(Debug, Clone, Args, Serialize)]
struct RootArgs {
    /// Mission root directory.
    #[arg(value_name = "ROOT")]
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Inspect(args) => run_inspect(cli, args),
        Command::Verify(args) => run_verify(cli, args),
        Command::Tracks(args) => run_tracks(cli, args),
        Command::RecoverLock(args) => run_recover_lock(cli, args),
    }
}

fn backend() -> SharedBackend {
    StdFsBackend::shared()
}

fn load_config(cli: &Cli) -> Result<EngineConfig, CliError> {
    EngineConfig::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

/// Open both snapshots read-only; no lock, no self-heal.
fn inspect_root(root: &Path) -> Result<(MissionBundle, RecoveryReport), CliError> {
    let backend = backend();
    Reconciler::new(backend.as_ref())
        .inspect(root)
        .map_err(|e| CliError::Runtime(e.to_string()))
}

// ──────────────────── inspect ────────────────────

#[derive(Debug, Serialize)]
struct InspectSummary {
    root: String,
    mission_id: String,
    kind: &'static str,
    name: String,
    schema_version: u32,
    created_at: String,
    updated_at: String,
    tracks: usize,
    active_tracks: usize,
    route_features: usize,
    marker_features: usize,
    locked: bool,
}

fn run_inspect(cli: &Cli, args: &RootArgs) -> Result<(), CliError> {
    let _ = load_config(cli)?;
    let (bundle, _) = inspect_root(&args.root)?;
    let locked = LockManager::new(backend().as_ref()).has_lock(&args.root);

    let doc = &bundle.document;
    let summary = InspectSummary {
        root: args.root.display().to_string(),
        mission_id: doc.mission_id.clone(),
        kind: if doc.kind.is_draft() { "draft" } else { "named" },
        name: doc.kind.display_name().to_string(),
        schema_version: doc.schema_version,
        created_at: doc.created_at.clone(),
        updated_at: doc.updated_at.clone(),
        tracks: doc.tracks.len(),
        active_tracks: doc.active_tracks.len(),
        route_features: bundle.routes.features.len(),
        marker_features: bundle.markers.features.len(),
        locked,
    };

    match output_mode(cli) {
        OutputMode::Human => {
            println!("Mission {} ({})", summary.name, summary.mission_id);
            println!("  Root:       {}", summary.root);
            println!("  Kind:       {}", summary.kind);
            println!("  Schema:     v{}", summary.schema_version);
            println!("  Created:    {}", summary.created_at);
            println!("  Updated:    {}", summary.updated_at);
            println!(
                "  Tracks:     {} ({} active)",
                summary.tracks, summary.active_tracks
            );
            println!(
                "  Geometry:   {} route features, {} marker features",
                summary.route_features, summary.marker_features
            );
            println!("  Locked:     {}", if summary.locked { "yes" } else { "no" });
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&summary)?)?,
    }
    Ok(())
}

// ──────────────────── verify ────────────────────

fn source_label(source: RecoverySource) -> &'static str {
    match source {
        RecoverySource::CheckpointOnly => "checkpoint (no usable WAL)",
        RecoverySource::WalOnly => "WAL (no usable checkpoint)",
        RecoverySource::CheckpointNewer => "checkpoint (newer than WAL)",
        RecoverySource::WalNewer => "WAL (newer than checkpoint)",
    }
}

fn run_verify(cli: &Cli, args: &RootArgs) -> Result<(), CliError> {
    let _ = load_config(cli)?;
    let (bundle, report) = inspect_root(&args.root)?;

    let wal_pending = matches!(
        report.source,
        RecoverySource::WalOnly | RecoverySource::WalNewer
    );
    match output_mode(cli) {
        OutputMode::Human => {
            println!("Mission {} verifies clean.", bundle.document.mission_id);
            println!("  Winning snapshot: {}", source_label(report.source));
            if wal_pending {
                println!("  Note: the next open will re-checkpoint from the WAL.");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "root": args.root.display().to_string(),
                "mission_id": bundle.document.mission_id,
                "source": format!("{:?}", report.source),
                "wal_recovery_pending": wal_pending,
                "updated_at": bundle.document.updated_at,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── tracks ────────────────────

#[derive(Debug, Serialize)]
struct TrackRow {
    id: String,
    agent_id: Option<String>,
    file: String,
    started_at: String,
    ended_at: Option<String>,
    points: usize,
    active: bool,
}

fn run_tracks(cli: &Cli, args: &RootArgs) -> Result<(), CliError> {
    let _ = load_config(cli)?;
    let (bundle, _) = inspect_root(&args.root)?;

    let rows: Vec<TrackRow> = bundle
        .document
        .tracks
        .iter()
        .map(|t| TrackRow {
            id: t.id.clone(),
            agent_id: t.agent_id.clone(),
            file: t.file.clone(),
            started_at: t.started_at.clone(),
            ended_at: t.ended_at.clone(),
            points: bundle.points_of(&t.id).len(),
            active: bundle
                .document
                .active_tracks
                .values()
                .any(|id| id == &t.id),
        })
        .collect();

    match output_mode(cli) {
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No tracks recorded.");
                return Ok(());
            }
            println!("{:<28} {:<12} {:>8}  {:<24}  STATE", "TRACK", "AGENT", "POINTS", "STARTED");
            for row in &rows {
                println!(
                    "{:<28} {:<12} {:>8}  {:<24}  {}",
                    row.id,
                    row.agent_id.as_deref().unwrap_or("-"),
                    row.points,
                    row.started_at,
                    if row.active { "active" } else { "closed" }
                );
            }
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&rows)?)?,
    }
    Ok(())
}

// ──────────────────── recover-lock ────────────────────

fn run_recover_lock(cli: &Cli, args: &RootArgs) -> Result<(), CliError> {
    let _ = load_config(cli)?;
    let backend = backend();
    let manager = LockManager::new(backend.as_ref());

    let marker = manager
        .read_marker(&args.root)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let Some(marker) = marker else {
        return Err(CliError::User(format!(
            "no lock marker found under {}",
            args.root.display()
        )));
    };

    manager
        .release(&args.root)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!("Cleared lock marker under {}.", args.root.display());
            println!("  Previous owner: {}", marker.owner);
            println!("  Held since:     {}", marker.created_at);
        }
        OutputMode::Json => {
            let payload = json!({
                "root": args.root.display().to_string(),
                "cleared": true,
                "previous_owner": marker.owner,
                "held_since": marker.created_at,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── output plumbing ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MST_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(
            resolve_output_mode(false, Some("auto"), true),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn cli_parses_every_subcommand() {
        for cmd in ["inspect", "verify", "tracks", "recover-lock"] {
            let cli = Cli::try_parse_from(["mstore", cmd, "/tmp/mission"]).unwrap();
            match (cmd, &cli.command) {
                ("inspect", Command::Inspect(_))
                | ("verify", Command::Verify(_))
                | ("tracks", Command::Tracks(_))
                | ("recover-lock", Command::RecoverLock(_)) => {}
                _ => panic!("subcommand {cmd} parsed to the wrong variant"),
            }
        }
    }

    #[test]
    fn global_flags_parse_anywhere() {
        let cli =
            Cli::try_parse_from(["mstore", "inspect", "/tmp/mission", "--json", "--no-color"])
                .unwrap();
        assert!(cli.json);
        assert!(cli.no_color);
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(CliError::User("x".to_string()).exit_code(), 1);
        assert_eq!(CliError::Runtime("x".to_string()).exit_code(), 2);
    }
}
