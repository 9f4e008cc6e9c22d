//! # orecstm
//!
//! Bias-adaptive software transactional memory.
//!
//! Threads share [`TxnRef`]s and change them inside optimistic
//! transactions that either commit atomically or abort without visible
//! effects. Every ref carries an orec (ownership record) that combines a
//! lock, a count of arrived readers and a read-biased mode for hot,
//! rarely written refs.
//!
//! ## Quick Start
//!
//! ```
//! use orecstm::prelude::*;
//!
//! let stm = Stm::new();
//! let account = stm.new_ref(100i64);
//!
//! let mut tx = stm.new_transaction();
//! tx.open_for_write(&account, LockMode::None)?.value -= 30;
//! tx.commit()?;
//!
//! assert_eq!(account.committed_value(), Some(70));
//! # Ok::<(), orecstm::StmError>(())
//! ```
//!
//! ## Retrying
//!
//! A transaction that fails with a conflict has already released everything
//! it held. [`Transaction::soft_reset`] starts the next attempt until the
//! family's retry budget is used up:
//!
//! ```
//! use orecstm::prelude::*;
//!
//! let stm = Stm::new();
//! let counter = stm.new_ref(0u64);
//!
//! let mut tx = stm.new_transaction();
//! loop {
//!     let outcome = tx
//!         .open_for_write(&counter, LockMode::None)
//!         .map(|t| t.value += 1)
//!         .and_then(|_| tx.commit());
//!     match outcome {
//!         Ok(()) => break,
//!         Err(e) if e.is_retryable() && tx.soft_reset() => continue,
//!         Err(e) => return Err(e),
//!     }
//! }
//! assert_eq!(counter.committed_value(), Some(1));
//! # Ok::<(), orecstm::StmError>(())
//! ```
//!
//! ## Crates
//!
//! - `orecstm-core`: errors, ids, configuration, latches, lifecycle hooks
//! - `orecstm-concurrency`: [`Orec`] and the conflict counters
//! - `orecstm-engine`: [`Stm`], [`Transaction`] and the commit protocol

#![warn(missing_docs)]

pub mod prelude;

pub use orecstm_concurrency::{
    Arrival, GlobalConflictCounter, LocalConflictCounter, Orec, OrecSnapshot, READ_BIASED_THRESHOLD,
};
pub use orecstm_core::{
    IsolationLevel, Latch, ListenerRef, LockMode, LockStatus, PessimisticLockLevel, RefId, Result,
    StmError, TransactionConfig, TransactionLifecycleEvent, TransactionLifecycleListener,
    TransactionStatus, TxnId,
};
pub use orecstm_engine::{
    AttachedSetKind, CommuteFn, DirtyState, EntryKind, SpeculativeConfig, Stm, StmBuilder,
    Tranlocal, Transaction, TransactionFactory, TransactionPool, TxnRef, TxnValue, MAX_POOL_SIZE,
};
