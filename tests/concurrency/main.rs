//! Concurrency Integration Tests
//!
//! Multi-threaded stress tests: every thread runs its own transactions
//! against shared refs and retries on conflict.

#[path = "../common/mod.rs"]
mod common;

mod contention;
