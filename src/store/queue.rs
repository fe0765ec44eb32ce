//! Per-root save queue.
//!
//! Every durable write against one mission root is serialized by holding
//! that root's slot mutex for the duration of the operation; writes against
//! different roots proceed concurrently. parking_lot mutexes do not poison,
//! so an operation that returns an error (or panics in a test) surfaces to
//! its own caller without wedging the queue for the next operation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Serializes operations per mission root.
#[derive(Debug, Default)]
pub struct SaveQueue {
    slots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SaveQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the slot for `root`.
    pub fn run<T>(&self, root: &Path, op: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(
                slots
                    .entry(root.to_path_buf())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = slot.lock();
        op()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn operations_on_one_root_are_serialized() {
        let queue = Arc::new(SaveQueue::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(thread::spawn(move || {
                queue.run(Path::new("/m"), || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_roots_do_not_block_each_other() {
        let queue = Arc::new(SaveQueue::new());

        let blocker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.run(Path::new("/a"), || {
                    thread::sleep(Duration::from_millis(100));
                });
            })
        };
        // Give the blocker time to take /a's slot.
        thread::sleep(Duration::from_millis(20));

        let start = std::time::Instant::now();
        queue.run(Path::new("/b"), || {});
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "op on /b waited on /a's slot"
        );
        blocker.join().unwrap();
    }

    #[test]
    fn a_failed_operation_does_not_block_the_next() {
        let queue = SaveQueue::new();
        let failed: Result<(), &str> = queue.run(Path::new("/m"), || Err("write failed"));
        assert!(failed.is_err());

        // Queue is still usable for the same root.
        let ok: Result<(), &str> = queue.run(Path::new("/m"), || Ok(()));
        assert!(ok.is_ok());
    }

    #[test]
    fn returns_operation_value() {
        let queue = SaveQueue::new();
        let value = queue.run(Path::new("/m"), || 41 + 1);
        assert_eq!(value, 42);
    }
}
