//! Transactional references
//!
//! A [`TxnRef`] is a cheap, cloneable handle to a shared cell. Each ref owns
//! its [`Orec`] and a pointer to its latest committed [`Tranlocal`]. Refs
//! created inside a transaction have no committed value until that
//! transaction commits; their orec starts commit-locked by the creator, so
//! nobody else can open them in the meantime.
//!
//! Besides opening a ref through a [`Transaction`], a ref offers:
//! - shorthand transactional access: [`TxnRef::get`], [`TxnRef::set`],
//!   [`TxnRef::get_and_set`], [`TxnRef::alter`], [`TxnRef::lock_and_get`],
//!   [`TxnRef::lock_and_set`]
//! - single-ref atomic access outside any transaction:
//!   [`TxnRef::atomic_get`], [`TxnRef::atomic_set`],
//!   [`TxnRef::atomic_get_and_set`]. These go through the orec like a one-ref
//!   transaction would: a commit lock blocks them, reads count towards read
//!   bias, writes signal the conflict counter and open retry latches.

use crate::entry::release_after_failure;
use crate::stm::Stm;
use crate::tranlocal::{Tranlocal, TxnValue};
use crate::transaction::Transaction;
use orecstm_concurrency::{Arrival, Orec};
use orecstm_core::{LockMode, LockStatus, RefId, Result, StmError, TxnId};
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Spins an atomic read waits for a commit lock to go away
const ATOMIC_READ_SPIN: u32 = 50;

struct RefInner<T: TxnValue> {
    id: RefId,
    orec: Orec,
    committed: RwLock<Option<Arc<Tranlocal<T>>>>,
    creator: Option<TxnId>,
}

/// Handle to a transactional reference
pub struct TxnRef<T: TxnValue> {
    inner: Arc<RefInner<T>>,
}

impl<T: TxnValue> TxnRef<T> {
    /// Ref that already holds a committed `value`
    pub(crate) fn new_committed(value: T) -> Self {
        let id = RefId::next();
        TxnRef {
            inner: Arc::new(RefInner {
                id,
                orec: Orec::new(),
                committed: RwLock::new(Some(Arc::new(Tranlocal::committed(id, value)))),
                creator: None,
            }),
        }
    }

    /// Ref created by `creator`, commit-locked until it is constructed and
    /// committed
    pub(crate) fn new_uncommitted(creator: TxnId) -> Self {
        TxnRef {
            inner: Arc::new(RefInner {
                id: RefId::next(),
                orec: Orec::new_locked(creator),
                committed: RwLock::new(None),
                creator: Some(creator),
            }),
        }
    }

    /// Identity of this ref
    pub fn id(&self) -> RefId {
        self.inner.id
    }

    /// The ref's ownership record
    pub fn orec(&self) -> &Orec {
        &self.inner.orec
    }

    /// Transaction that created this ref, `None` for refs created committed
    pub fn creator(&self) -> Option<TxnId> {
        self.inner.creator
    }

    /// Whether a value has been published
    pub fn is_committed(&self) -> bool {
        self.inner.committed.read().is_some()
    }

    /// Latest committed snapshot
    pub fn load_committed(&self) -> Option<Arc<Tranlocal<T>>> {
        self.inner.committed.read().clone()
    }

    /// Latest published value, ignoring locks and the orec
    ///
    /// Meant for inspection; [`TxnRef::atomic_get`] is the read that
    /// respects a concurrent commit.
    pub fn committed_value(&self) -> Option<T> {
        self.inner.committed.read().as_ref().map(|t| t.value.clone())
    }

    /// Who holds this ref's lock, from `tx`'s point of view
    pub fn lock_status(&self, tx: &Transaction) -> LockStatus {
        let orec = self.orec();
        if !orec.lock_mode().is_locked() {
            return LockStatus::Free;
        }
        if orec.lock_owner() == Some(tx.id()) {
            LockStatus::LockedBySelf
        } else {
            LockStatus::LockedByOther
        }
    }

    // =========================================================================
    // Transactional shorthands
    // =========================================================================

    /// Current value within `tx`
    pub fn get(&self, tx: &mut Transaction) -> Result<T> {
        Ok(tx.open_for_read(self, LockMode::None)?.value.clone())
    }

    /// Current value within `tx`, commit-locking the ref
    pub fn lock_and_get(&self, tx: &mut Transaction) -> Result<T> {
        Ok(tx.open_for_read(self, LockMode::Commit)?.value.clone())
    }

    /// Set the value within `tx`
    pub fn set(&self, tx: &mut Transaction, value: T) -> Result<()> {
        tx.open_for_write(self, LockMode::None)?.value = value;
        Ok(())
    }

    /// Set the value within `tx`, commit-locking the ref
    pub fn lock_and_set(&self, tx: &mut Transaction, value: T) -> Result<()> {
        tx.open_for_write(self, LockMode::Commit)?.value = value;
        Ok(())
    }

    /// Set the value within `tx` and return the previous one
    pub fn get_and_set(&self, tx: &mut Transaction, value: T) -> Result<T> {
        let tranlocal = tx.open_for_write(self, LockMode::None)?;
        Ok(std::mem::replace(&mut tranlocal.value, value))
    }

    /// Apply `f` to the value within `tx` and return the result
    ///
    /// A panic in `f` aborts `tx` before it continues.
    pub fn alter(&self, tx: &mut Transaction, f: impl FnOnce(T) -> T) -> Result<T> {
        tx.alter(self, f)
    }

    // =========================================================================
    // Atomic access
    // =========================================================================

    /// Read the committed value without a transaction
    ///
    /// Arrives at and departs from the orec, so the read counts towards read
    /// bias exactly like a read-only transaction.
    ///
    /// # Errors
    /// `ReadWriteConflict` when the ref is commit-locked or not committed.
    pub fn atomic_get(&self) -> Result<T> {
        let orec = self.orec();
        let arrival = orec.arrive(ATOMIC_READ_SPIN);
        if arrival == Arrival::Locked {
            return Err(StmError::ReadWriteConflict(format!("{} is commit-locked", self.id())));
        }

        match self.load_committed() {
            Some(committed) => {
                if arrival.has_depart_obligation() {
                    orec.depart_after_reading();
                }
                Ok(committed.value.clone())
            }
            None => {
                if arrival.has_depart_obligation() {
                    orec.depart_after_failure();
                }
                Err(StmError::ReadWriteConflict(format!("{} has not been committed", self.id())))
            }
        }
    }

    /// Publish `value` without a transaction
    ///
    /// # Errors
    /// As [`TxnRef::atomic_get_and_set`].
    pub fn atomic_set(&self, stm: &Stm, value: T) -> Result<()> {
        self.atomic_get_and_set(stm, value).map(|_| ())
    }

    /// Publish `value` without a transaction and return the previous value
    ///
    /// Behaves like a one-ref transaction of `stm`: the ref is commit-locked
    /// while the value is swapped, the conflict counter is signalled and
    /// retry latches are opened. Writing the current value publishes
    /// nothing and counts as a read.
    ///
    /// # Errors
    /// `ReadWriteConflict` when another transaction holds a lock on the ref
    /// or it is not committed.
    pub fn atomic_get_and_set(&self, stm: &Stm, value: T) -> Result<T> {
        let orec = self.orec();
        let owner = TxnId::next();
        let arrival = orec.arrive_and_lock(stm.default_config().spin_count, owner, LockMode::Commit);
        if arrival == Arrival::Locked {
            return Err(StmError::ReadWriteConflict(format!("{} is locked", self.id())));
        }
        let obligation = arrival.has_depart_obligation();

        let Some(previous) = self.load_committed() else {
            release_after_failure(orec, owner, LockMode::Commit, obligation);
            return Err(StmError::ReadWriteConflict(format!("{} has not been committed", self.id())));
        };

        if previous.value == value {
            if obligation {
                orec.depart_after_reading_and_unlock(owner);
            } else {
                orec.unlock(owner);
            }
            return Ok(value);
        }

        stm.counter().signal();
        self.publish(Arc::new(Tranlocal::committed(self.id(), value)));
        let latches = orec.take_listeners();
        orec.depart_after_update_and_unlock(owner, obligation);
        for latch in &latches {
            latch.open();
        }
        Ok(previous.value.clone())
    }

    /// Whether `base` is still the committed snapshot
    pub(crate) fn is_current(&self, base: &Arc<Tranlocal<T>>) -> bool {
        matches!(&*self.inner.committed.read(), Some(current) if Arc::ptr_eq(current, base))
    }

    /// Make `tranlocal` the committed snapshot. Caller holds the commit lock.
    pub(crate) fn publish(&self, tranlocal: Arc<Tranlocal<T>>) {
        *self.inner.committed.write() = Some(tranlocal);
    }
}

impl<T: TxnValue> Clone for TxnRef<T> {
    fn clone(&self) -> Self {
        TxnRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TxnValue> PartialEq for TxnRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: TxnValue> Eq for TxnRef<T> {}

impl<T: TxnValue> Hash for TxnRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T: TxnValue> fmt::Debug for TxnRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnRef")
            .field("id", &self.inner.id)
            .field("orec", &self.inner.orec.snapshot())
            .field("committed", &self.is_committed())
            .finish()
    }
}
