//! Transaction lifecycle notifications
//!
//! Listeners are told about the five points of a transaction's life where
//! outside code may want to hook in. Permanent listeners (which survive a
//! soft reset) are notified before normal ones, each group in registration
//! order.

use crate::types::TxnId;
use std::sync::Arc;

/// Point in a transaction's life a listener is notified at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionLifecycleEvent {
    /// Before any prepare work
    PrePrepare,
    /// After the transaction became Prepared
    PostPrepare,
    /// Before write-back
    PreCommit,
    /// After the transaction became Committed
    PostCommit,
    /// After the transaction became Aborted
    PostAbort,
}

/// Callback notified at lifecycle points
///
/// A panicking listener aborts the transaction; the panic is then resumed.
pub trait TransactionLifecycleListener: Send + Sync {
    /// Handle one lifecycle event of transaction `txn`
    fn notify(&self, txn: TxnId, event: TransactionLifecycleEvent);
}

impl<F> TransactionLifecycleListener for F
where
    F: Fn(TxnId, TransactionLifecycleEvent) + Send + Sync,
{
    fn notify(&self, txn: TxnId, event: TransactionLifecycleEvent) {
        self(txn, event)
    }
}

/// Shared handle to a listener
pub type ListenerRef = Arc<dyn TransactionLifecycleListener>;
