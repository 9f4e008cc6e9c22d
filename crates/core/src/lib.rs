//! Core types for orecstm
//!
//! This crate defines the vocabulary shared by the concurrency and engine
//! layers:
//! - [`StmError`] and [`Result`]: the single error type of every transactional
//!   operation
//! - [`TxnId`], [`RefId`]: identities
//! - [`LockMode`], [`LockStatus`], [`IsolationLevel`], [`PessimisticLockLevel`],
//!   [`TransactionStatus`]
//! - [`TransactionConfig`]: per-family configuration
//! - [`Latch`]: one-shot event used by blocking retry
//! - [`TransactionLifecycleListener`]: lifecycle hooks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod latch;
pub mod lifecycle;
pub mod types;

pub use config::TransactionConfig;
pub use error::{Result, StmError};
pub use latch::Latch;
pub use lifecycle::{ListenerRef, TransactionLifecycleEvent, TransactionLifecycleListener};
pub use types::{
    IsolationLevel, LockMode, LockStatus, PessimisticLockLevel, RefId, TransactionStatus, TxnId,
};
