//! Transaction engine for orecstm
//!
//! This crate turns the orec and conflict-counter primitives into
//! transactions:
//! - [`Stm`]: the STM instance; owns the global conflict counter
//! - [`TxnRef`]: a transactional reference
//! - [`Tranlocal`]: a transaction's view of one ref's value
//! - [`Transaction`]: open, commute, prepare, commit, abort, blocking retry
//! - [`TransactionFactory`]: one transaction family (config + learned sizing)
//! - [`TransactionPool`]: thread-local transaction reuse
//!
//! # Architecture
//!
//! ```text
//! Stm ──▶ TransactionFactory ──▶ Transaction ──▶ AttachedSet ──▶ Entry<T>
//!                                                                  │
//!                                          TxnRef<T> ◀─────────────┘
//!                                          ├─ Orec
//!                                          └─ committed Tranlocal<T>
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod attached;
mod entry;
pub mod factory;
pub mod reference;
pub mod speculative;
pub mod stm;
pub mod tranlocal;
pub mod transaction;

pub use entry::EntryKind;
pub use factory::TransactionFactory;
pub use reference::TxnRef;
pub use speculative::{AttachedSetKind, SpeculativeConfig};
pub use stm::{Stm, StmBuilder};
pub use tranlocal::{CommuteFn, DirtyState, Tranlocal, TxnValue};
pub use transaction::{Transaction, TransactionPool, MAX_POOL_SIZE};
