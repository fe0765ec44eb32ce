//! The persistence pipeline: locking, WAL staging, checkpointing, recovery
//! reconciliation, per-root save serialization, and the repository façade
//! tying them together.

pub mod checkpoint;
pub mod lock;
pub mod queue;
pub mod recover;
pub mod repository;
pub mod wal;

pub use checkpoint::{CheckpointOptions, CheckpointWriter};
pub use lock::{LockManager, LockMarker};
pub use queue::SaveQueue;
pub use recover::{Reconciler, RecoveryReport, RecoverySource};
pub use repository::{OpenOptions, Repository};
pub use wal::{StageOptions, WalStager};
