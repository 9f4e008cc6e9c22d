//! Core types for the transactional memory engine
//!
//! This module defines the fundamental types used throughout the system:
//! - [`TxnId`]: Identity of a transaction, recorded as orec lock owner
//! - [`RefId`]: Identity of a transactional reference
//! - [`LockMode`]: Lock strength an orec can be held with
//! - [`IsolationLevel`] and [`PessimisticLockLevel`]: per-transaction policy
//! - [`TransactionStatus`]: Lifecycle state of a transaction

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
///
/// Process-unique, so refs and transactions of different `Stm` instances
/// never collide. Zero is never handed out; orecs use it to mean "no owner".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        TxnId(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id. Returns `None` for the reserved value zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(TxnId(raw))
        }
    }

    /// Get the raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Unique identifier for a transactional reference
///
/// Attached sets are keyed by `RefId`; two handles to the same reference
/// always share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefId(u64);

impl RefId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        RefId(NEXT_REF_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref-{}", self.0)
    }
}

/// Lock strength on an orec
///
/// Modes are ordered: a holder may upgrade `Update` to `Commit` but never
/// downgrade.
///
/// | Mode | Other readers | Other lockers |
/// |------|---------------|---------------|
/// | `None` | allowed | allowed |
/// | `Update` | allowed | rejected |
/// | `Commit` | rejected | rejected |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LockMode {
    /// No lock held
    #[default]
    None,
    /// Exclusive against other lockers, readers may still arrive
    Update,
    /// Exclusive against everybody; required to publish a write
    Commit,
}

impl LockMode {
    /// Whether this mode holds any lock
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockMode::None)
    }
}

/// Who holds a ref's lock, as seen from one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockStatus {
    /// Nobody holds a lock
    Free,
    /// The asking transaction holds it
    LockedBySelf,
    /// Another transaction holds it
    LockedByOther,
}

/// Isolation level of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IsolationLevel {
    /// Writes are validated at prepare, plain reads are not. Write skew is
    /// possible.
    #[default]
    Snapshot,
    /// Plain reads are locked and validated at prepare as well, which
    /// rules out write skew.
    Serializable,
}

impl IsolationLevel {
    /// Whether two transactions may each read what the other writes and
    /// both commit
    pub fn is_write_skew_allowed(&self) -> bool {
        matches!(self, IsolationLevel::Snapshot)
    }
}

/// Eager locking policy applied to every open of a transaction
///
/// `*Reads` levels lock every open (reads and writes), `*Writes` levels lock
/// only write opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PessimisticLockLevel {
    /// Lock nothing eagerly
    #[default]
    None,
    /// Update-lock every write open
    UpdateWrites,
    /// Commit-lock every write open
    CommitWrites,
    /// Update-lock every open
    UpdateReads,
    /// Commit-lock every open
    CommitReads,
}

impl PessimisticLockLevel {
    /// Minimum lock mode for a read open
    pub fn read_lock_mode(&self) -> LockMode {
        match self {
            PessimisticLockLevel::UpdateReads => LockMode::Update,
            PessimisticLockLevel::CommitReads => LockMode::Commit,
            _ => LockMode::None,
        }
    }

    /// Minimum lock mode for a write open
    pub fn write_lock_mode(&self) -> LockMode {
        match self {
            PessimisticLockLevel::None => LockMode::None,
            PessimisticLockLevel::UpdateWrites | PessimisticLockLevel::UpdateReads => {
                LockMode::Update
            }
            PessimisticLockLevel::CommitWrites | PessimisticLockLevel::CommitReads => {
                LockMode::Commit
            }
        }
    }
}

/// Lifecycle state of a transaction
///
/// ```text
/// Active ──prepare──▶ Prepared ──commit──▶ Committed
///   │                    │
///   └──────abort─────────┴──────────────▶ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Open for reads, writes and commutes
    Active,
    /// All write locks acquired and validated; only commit or abort remain
    Prepared,
    /// Terminal: writes published
    Committed,
    /// Terminal: all resources released, nothing published
    Aborted,
}

impl TransactionStatus {
    /// Committed or Aborted
    pub fn is_dead(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }

    /// Active or Prepared
    pub fn is_alive(&self) -> bool {
        !self.is_dead()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
