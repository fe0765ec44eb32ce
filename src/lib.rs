#![forbid(unsafe_code)]

//! Mission Store (mstore) — durable persistence engine for dive-mission
//! planning documents.
//!
//! A mission lives in one directory: `mission.json` (plus a backup copy),
//! GeoJSON route and marker collections, one CSV file per recorded track,
//! and a single write-ahead-log file. Saves happen in two debounced halves:
//! a fast WAL stage capturing the full in-memory bundle, then a checkpoint
//! rewriting the canonical files backup-first and consuming the WAL. On
//! open, a reconciler compares both snapshots by `updated_at` and
//! self-heals whichever side lost.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use mission_store::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use mission_store::core::config::EngineConfig;
//! use mission_store::store::repository::{OpenOptions, Repository};
//! ```

pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli_app;
pub mod codec;
pub mod core;
pub mod logger;
pub mod model;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod store;
