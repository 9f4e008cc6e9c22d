//! Global and local conflict counters
//!
//! Every committed write bumps the [`GlobalConflictCounter`] of its `Stm`
//! before the new value is published. A transaction keeps a
//! [`LocalConflictCounter`] snapshot taken at its first attach; as long as the
//! global counter has not moved, nothing it read can have been overwritten
//! and re-validation is skipped.
//!
//! A moved counter does not imply a real conflict: the write may have hit a
//! ref the transaction never touched. The engine re-validates its reads and
//! advances the local snapshot when they are still current.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter of committed writes, owned by one `Stm`
#[derive(Debug, Default)]
pub struct GlobalConflictCounter {
    count: AtomicU64,
}

impl GlobalConflictCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Record a committed write
    pub fn signal(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A transaction's snapshot of the global counter
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LocalConflictCounter {
    local: u64,
}

impl LocalConflictCounter {
    /// Take a fresh snapshot
    pub fn reset(&mut self, global: &GlobalConflictCounter) {
        self.local = global.count();
    }

    /// Snapshot value
    pub fn get(&self) -> u64 {
        self.local
    }

    /// Check whether the global counter moved since the snapshot
    ///
    /// The snapshot is advanced to the current value either way, so the
    /// caller must abort when the change turns out to be a real conflict.
    pub fn sync_and_check_conflict(&mut self, global: &GlobalConflictCounter) -> bool {
        let current = global.count();
        if current == self.local {
            return false;
        }
        self.local = current;
        true
    }
}
