//! Error types for transactional operations
//!
//! Every variant except the two "dead/prepared" state errors is returned
//! only after the transaction has been aborted, so the caller never has to
//! release locks or surplus itself.

use thiserror::Error;

/// All transaction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StmError {
    /// Operation on a committed or aborted transaction
    #[error("dead transaction: {0}")]
    DeadTransaction(String),

    /// Mutating operation on a prepared transaction (the transaction is
    /// aborted)
    #[error("prepared transaction: {0}")]
    PreparedTransaction(String),

    /// Stale read, foreign lock, write skew or abort-only
    #[error("read/write conflict: {0}")]
    ReadWriteConflict(String),

    /// Write, construction or commute under a readonly configuration
    #[error("readonly transaction: {0}")]
    Readonly(String),

    /// Fixed-capacity attached set overflowed; retry with a larger one
    #[error("speculative configuration failure: transaction needs room for {required} refs")]
    SpeculativeConfiguration {
        /// Number of refs the transaction tried to attach
        required: usize,
    },

    /// Retry requested without anything to wait on, or blocking disabled
    #[error("no retry possible: {0}")]
    NoRetryPossible(String),

    /// Invalid argument, e.g. constructing a ref that is not fresh
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

/// Result type for transactional operations.
pub type Result<T> = std::result::Result<T, StmError>;

impl StmError {
    /// Check if this error is retryable.
    ///
    /// Conflicts and speculative failures may succeed on a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StmError::ReadWriteConflict(_) | StmError::SpeculativeConfiguration { .. }
        )
    }

    /// Check if this is a read/write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StmError::ReadWriteConflict(_))
    }

    /// Check if the operation was rejected because the transaction was
    /// already dead.
    pub fn is_dead(&self) -> bool {
        matches!(self, StmError::DeadTransaction(_))
    }
}
