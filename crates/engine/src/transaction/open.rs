//! Open operations: read, write, construction, commute
//!
//! Every open of a ref not yet attached:
//! 1. snapshots the global conflict counter if this is the first read
//! 2. arrives at the ref's orec, taking the requested lock if any
//! 3. loads the committed snapshot and attaches an entry
//! 4. re-validates the attached set if the global counter moved
//!
//! Re-opening an attached ref returns the same tranlocal, upgrading its
//! lock when a stronger mode is asked for. It is never re-validated.

use super::Transaction;
use crate::entry::{release_after_failure, AttachedEntry, Entry, EntryKind};
use crate::reference::TxnRef;
use crate::tranlocal::{DirtyState, Tranlocal, TxnValue};
use orecstm_concurrency::Arrival;
use orecstm_core::{LockMode, RefId, Result, StmError};
use std::sync::Arc;

impl Transaction {
    /// Open `r` for reading
    ///
    /// # Arguments
    /// * `r` - ref to read
    /// * `mode` - lock to take; raised to the family's pessimistic level
    ///
    /// # Errors
    /// - `ReadWriteConflict` if the ref is commit-locked by someone else,
    ///   not committed yet, or a read conflict is detected
    /// - `PreparedTransaction` / `DeadTransaction` outside the active state
    pub fn open_for_read<T: TxnValue>(&mut self, r: &TxnRef<T>, mode: LockMode) -> Result<&Tranlocal<T>> {
        self.check_active("open_for_read")?;
        let mode = mode.max(self.config.pessimistic_lock_level.read_lock_mode());
        let id = r.id();

        if self.attached.contains(id) {
            self.reopen::<T>(id, mode)?;
            return Ok(self.entry::<T>(id).tranlocal());
        }

        self.start_reading();
        let arrival = self.arrive(r, mode)?;
        let committed = self.load_after_arrival(r, mode, arrival)?;

        if !self.config.read_tracking_enabled && !mode.is_locked() && arrival == Arrival::Permanent {
            // nothing to release later, so nothing to attach
            // a repeated read keeps the first snapshot
            self.has_untracked_reads = true;
            self.untracked.entry(id).or_insert(committed);
            if self.has_read_conflict() {
                return Err(self.conflict(format!("read conflict detected while reading {id}")));
            }
            return Ok(self.untracked_read::<T>(id));
        }

        self.attach(Box::new(Entry::read(r.clone(), committed, mode, arrival)))?;
        if self.has_read_conflict() {
            return Err(self.conflict(format!("read conflict detected while reading {id}")));
        }
        Ok(self.entry::<T>(id).tranlocal())
    }

    /// Open an optional ref for reading; `None` reads nothing
    pub fn open_for_read_opt<T: TxnValue>(
        &mut self,
        r: Option<&TxnRef<T>>,
        mode: LockMode,
    ) -> Result<Option<&Tranlocal<T>>> {
        match r {
            Some(r) => self.open_for_read(r, mode).map(Some),
            None => {
                self.check_active("open_for_read")?;
                Ok(None)
            }
        }
    }

    /// Open `r` for writing and return the private copy
    ///
    /// Opening twice returns the same copy. A ref that was only commuted so
    /// far is materialized: its committed value is loaded and the queued
    /// functions applied.
    ///
    /// # Errors
    /// As [`Transaction::open_for_read`], plus `Readonly` for readonly
    /// families.
    pub fn open_for_write<T: TxnValue>(&mut self, r: &TxnRef<T>, mode: LockMode) -> Result<&mut Tranlocal<T>> {
        self.check_active("open_for_write")?;
        if self.config.readonly {
            return Err(self.readonly_violation("open_for_write", r.id()));
        }
        let mode = mode.max(self.config.pessimistic_lock_level.write_lock_mode());
        let id = r.id();

        if self.attached.contains(id) {
            self.reopen::<T>(id, mode)?;
            return Ok(self.entry_mut::<T>(id).make_private());
        }

        self.start_reading();
        let arrival = self.arrive(r, mode)?;
        let committed = self.load_after_arrival(r, mode, arrival)?;
        self.attach(Box::new(Entry::write(r.clone(), &committed, mode, arrival)))?;
        if self.has_read_conflict() {
            return Err(self.conflict(format!("read conflict detected while writing {id}")));
        }
        Ok(self.entry_mut::<T>(id).make_private())
    }

    /// Open a ref created by this transaction to give it its first value
    ///
    /// The ref is already commit-locked by this transaction; the returned
    /// tranlocal holds `T::default()` and has no base.
    ///
    /// # Errors
    /// `IllegalArgument` when the ref was created elsewhere, is committed,
    /// or was already opened in this transaction. `Readonly` for readonly
    /// families.
    pub fn open_for_construction<T: TxnValue>(&mut self, r: &TxnRef<T>) -> Result<&mut Tranlocal<T>> {
        self.check_active("open_for_construction")?;
        if self.config.readonly {
            return Err(self.readonly_violation("open_for_construction", r.id()));
        }
        let id = r.id();
        if self.attached.contains(id) {
            return Err(self.fail(StmError::IllegalArgument(format!(
                "{id} was already opened in transaction {}",
                self.id
            ))));
        }
        if r.creator() != Some(self.id) || r.is_committed() {
            return Err(self.fail(StmError::IllegalArgument(format!(
                "{id} was not created by transaction {}",
                self.id
            ))));
        }

        self.attach(Box::new(Entry::construction(r.clone())))?;
        Ok(self.entry_mut::<T>(id).make_private())
    }

    /// Create a ref owned by this transaction
    ///
    /// Nobody else can open it until this transaction constructs and commits
    /// it.
    pub fn new_ref<T: TxnValue>(&mut self) -> Result<TxnRef<T>> {
        self.check_active("new_ref")?;
        Ok(TxnRef::new_uncommitted(self.id))
    }

    /// Create a ref, construct it and set its value
    pub fn construct<T: TxnValue>(&mut self, value: T) -> Result<TxnRef<T>> {
        let r = self.new_ref::<T>()?;
        self.open_for_construction(&r)?.value = value;
        Ok(r)
    }

    /// Apply `f` to the value of `r` without reading it eagerly
    ///
    /// On a ref that is not attached yet this only queues `f`; nothing is
    /// arrived at or locked until the ref is opened or the transaction
    /// prepares, where queued functions run in call order. On an attached
    /// ref `f` runs immediately on the private copy.
    ///
    /// A panic in `f` aborts the transaction and is resumed.
    pub fn commute<T, F>(&mut self, r: &TxnRef<T>, f: F) -> Result<()>
    where
        T: TxnValue,
        F: FnOnce(T) -> T + Send + Sync + 'static,
    {
        self.check_active("commute")?;
        if self.config.readonly {
            return Err(self.readonly_violation("commute", r.id()));
        }
        let id = r.id();
        let attached_kind = self.attached.get(id).map(|e| e.kind());

        match attached_kind {
            Some(EntryKind::Commuting) => {
                self.entry_mut::<T>(id).push_commuting(Box::new(f));
                Ok(())
            }
            Some(_) => {
                self.open_for_write(r, LockMode::None)?;
                self.apply_now::<T, F>(id, f);
                Ok(())
            }
            None if self.config.pessimistic_lock_level.write_lock_mode().is_locked() => {
                self.open_for_write(r, LockMode::None)?;
                self.apply_now::<T, F>(id, f);
                Ok(())
            }
            None => self.attach(Box::new(Entry::commuting(r.clone(), Box::new(f)))),
        }
    }

    /// Apply `f` to `r`'s value right away and return the result
    ///
    /// Unlike [`Transaction::commute`] the ref is opened for write first, so
    /// the result is visible immediately. A panic in `f` aborts the
    /// transaction before it continues.
    pub fn alter<T, F>(&mut self, r: &TxnRef<T>, f: F) -> Result<T>
    where
        T: TxnValue,
        F: FnOnce(T) -> T,
    {
        self.open_for_write(r, LockMode::None)?;
        self.apply_now::<T, F>(r.id(), f);
        Ok(self.entry::<T>(r.id()).tranlocal().value.clone())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn readonly_violation(&mut self, op: &str, id: RefId) -> StmError {
        let family = self.config.family_name.clone();
        self.fail(StmError::Readonly(format!(
            "{op} of {id} in readonly family '{family}'"
        )))
    }

    /// Bring an attached entry up to `mode`
    fn reopen<T: TxnValue>(&mut self, id: RefId, mode: LockMode) -> Result<()> {
        match self.entry::<T>(id).kind() {
            EntryKind::Commuting => self.materialize::<T>(id, mode),
            EntryKind::Construction => Ok(()),
            EntryKind::Read | EntryKind::Write => {
                let (owner, spin) = (self.id, self.config.spin_count);
                let entry = self.entry_mut::<T>(id);
                if mode <= entry.lock {
                    return Ok(());
                }
                if let Err(reason) = entry.lock_and_validate(owner, spin, mode) {
                    return Err(self.conflict(reason));
                }
                Ok(())
            }
        }
    }

    /// Load the committed value under a commuting entry and run its queue
    fn materialize<T: TxnValue>(&mut self, id: RefId, mode: LockMode) -> Result<()> {
        self.start_reading();
        let (owner, spin) = (self.id, self.config.spin_count);
        if let Err(reason) = self.entry_mut::<T>(id).load_for_commute(owner, spin, mode) {
            return Err(self.conflict(reason));
        }
        self.guard_user_code(|tx| tx.entry_mut::<T>(id).evaluate_commuting());
        if self.has_read_conflict() {
            return Err(self.conflict(format!("read conflict detected while materializing {id}")));
        }
        Ok(())
    }

    fn apply_now<T, F>(&mut self, id: RefId, f: F)
    where
        T: TxnValue,
        F: FnOnce(T) -> T,
    {
        self.guard_user_code(move |tx| {
            let tranlocal = tx.entry_mut::<T>(id).make_private();
            let current = std::mem::take(&mut tranlocal.value);
            tranlocal.value = f(current);
            tranlocal.dirty = DirtyState::Unknown;
        });
    }

    /// Arrive at the orec of a ref that is not attached yet
    fn arrive<T: TxnValue>(&mut self, r: &TxnRef<T>, mode: LockMode) -> Result<Arrival> {
        let spin = self.config.spin_count;
        let orec = r.orec();
        let arrival = if mode.is_locked() {
            orec.arrive_and_lock(spin, self.id, mode)
        } else {
            orec.arrive(spin)
        };
        if arrival != Arrival::Locked {
            return Ok(arrival);
        }

        let id = r.id();
        if r.creator() == Some(self.id) {
            return Err(self.fail(StmError::IllegalArgument(format!(
                "{id} was created by this transaction and must be opened for construction first"
            ))));
        }
        if !r.is_committed() {
            return Err(self.conflict(format!("{id} was created by another transaction and is not committed")));
        }
        Err(self.conflict(format!("{id} is locked by another transaction")))
    }

    /// Committed snapshot of a ref just arrived at; an uncommitted ref
    /// releases the arrival and fails
    fn load_after_arrival<T: TxnValue>(
        &mut self,
        r: &TxnRef<T>,
        mode: LockMode,
        arrival: Arrival,
    ) -> Result<Arc<Tranlocal<T>>> {
        match r.load_committed() {
            Some(committed) => Ok(committed),
            None => {
                release_after_failure(r.orec(), self.id, mode, arrival.has_depart_obligation());
                Err(self.conflict(format!("{} has not been committed", r.id())))
            }
        }
    }

    fn untracked_read<T: TxnValue>(&self, id: RefId) -> &Tranlocal<T> {
        match self.untracked.get(&id).and_then(|t| (**t).downcast_ref::<Tranlocal<T>>()) {
            Some(tranlocal) => tranlocal,
            None => unreachable!("untracked read of {id} was just recorded"),
        }
    }
}
