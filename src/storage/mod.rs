//! Injected storage seam: the trait the engine writes through, its std-fs
//! implementation, and the in-memory test double.

pub mod backend;
pub mod memory;

pub use backend::{FileStat, SharedBackend, StdFsBackend, StorageBackend};
pub use memory::MemoryBackend;
