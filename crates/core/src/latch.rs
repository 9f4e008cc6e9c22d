//! One-shot latch used for blocking retry
//!
//! A transaction that wants to wait for a change registers a [`Latch`] on
//! every orec it read and aborts. The next committing write to any of those
//! refs opens the latch. How the caller waits for that (spin, park, condvar)
//! is up to the caller.

use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot event. Once open it stays open.
#[derive(Debug, Default)]
pub struct Latch {
    open: AtomicBool,
}

impl Latch {
    /// Create a closed latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch. Opening an open latch does nothing.
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    /// Check if the latch has been opened
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
