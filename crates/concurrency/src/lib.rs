//! Concurrency primitives for orecstm
//!
//! This crate implements the per-reference concurrency control used by the
//! transaction engine:
//! - [`Orec`]: lock, surplus, bias and listener set packed around one atomic
//!   word
//! - [`GlobalConflictCounter`] / [`LocalConflictCounter`]: cheap detection of
//!   "something was written since I last looked"

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod orec;

pub use conflict::{GlobalConflictCounter, LocalConflictCounter};
pub use orec::{Arrival, Orec, OrecSnapshot, READ_BIASED_THRESHOLD};
