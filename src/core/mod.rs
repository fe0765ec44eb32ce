//! Core primitives shared by every module: errors, configuration, the
//! mission-root layout.

pub mod config;
pub mod errors;
pub mod paths;
