//! Attached entries: what a transaction holds per ref
//!
//! An [`Entry`] pairs a ref with the tranlocal the transaction works on and
//! with the orec resources it acquired: the lock mode it holds and whether it
//! owes the orec a departure. Entries of different value types live in one
//! attached set behind the object-safe [`AttachedEntry`] trait, which carries
//! every step of the commit protocol that does not need to know `T`.
//!
//! | Kind | Slot | Base |
//! |------|------|------|
//! | Read | shared committed tranlocal | the tranlocal itself |
//! | Write | private fork | `read` |
//! | Construction | private, default value | none |
//! | Commuting | private placeholder | none until materialized |

use crate::reference::TxnRef;
use crate::tranlocal::{CommuteFn, DirtyState, Tranlocal, TxnValue};
use orecstm_concurrency::{Arrival, Orec};
use orecstm_core::{IsolationLevel, Latch, LockMode, RefId, TxnId};
use smallvec::SmallVec;
use std::any::Any;
use std::sync::Arc;

/// Latches collected during write-back, opened after the commit completes
pub(crate) type Latches = SmallVec<[Arc<Latch>; 4]>;

/// What a transaction did with a ref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Opened for read only
    Read,
    /// Opened for write
    Write,
    /// Constructed in this transaction
    Construction,
    /// Only commuted; nothing read yet
    Commuting,
}

/// Outcome of registering a retry latch on an entry's orec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// Registered; the latch opens on the next write
    Done,
    /// The ref already changed, the latch was opened immediately
    NotNeeded,
    /// Nothing to watch (commute or construction)
    None,
}

/// Settings the prepare step needs from the transaction
pub(crate) struct PrepareContext {
    pub(crate) owner: TxnId,
    pub(crate) spin: u32,
    pub(crate) dirty_check: bool,
    pub(crate) isolation: IsolationLevel,
}

/// Type-erased view of an [`Entry`]
pub(crate) trait AttachedEntry: Send {
    fn ref_id(&self) -> RefId;
    fn kind(&self) -> EntryKind;
    /// Marked dirty by prepare; will be published
    fn is_dirty(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Whether the base this entry read from is no longer current
    fn has_read_conflict(&self, owner: TxnId) -> bool;

    /// Acquire the locks commit needs and validate. Commuting entries are
    /// materialized here, which runs user functions that may panic.
    fn prepare(&mut self, ctx: &PrepareContext) -> Result<(), String>;

    fn register_change_listener(&self, latch: &Arc<Latch>) -> Registration;

    /// Publish (if dirty) and release. Returns true when a value was
    /// published.
    fn commit(self: Box<Self>, owner: TxnId, latches: &mut Latches) -> bool;

    /// Release without publishing
    fn abort(self: Box<Self>, owner: TxnId);
}

/// Release orec resources held after a failed or aborted use
pub(crate) fn release_after_failure(orec: &Orec, owner: TxnId, lock: LockMode, obligation: bool) {
    match (lock.is_locked(), obligation) {
        (true, true) => orec.depart_after_failure_and_unlock(owner),
        (true, false) => orec.unlock(owner),
        (false, true) => orec.depart_after_failure(),
        (false, false) => {}
    }
}

pub(crate) enum Slot<T: TxnValue> {
    Read(Arc<Tranlocal<T>>),
    Private(Box<Tranlocal<T>>),
}

/// One attached ref of a transaction
pub(crate) struct Entry<T: TxnValue> {
    pub(crate) owner: TxnRef<T>,
    pub(crate) slot: Slot<T>,
    pub(crate) lock: LockMode,
    pub(crate) has_depart_obligation: bool,
}

impl<T: TxnValue> Entry<T> {
    pub(crate) fn read(owner: TxnRef<T>, committed: Arc<Tranlocal<T>>, lock: LockMode, arrival: Arrival) -> Self {
        Entry {
            owner,
            slot: Slot::Read(committed),
            lock,
            has_depart_obligation: arrival.has_depart_obligation(),
        }
    }

    pub(crate) fn write(owner: TxnRef<T>, committed: &Arc<Tranlocal<T>>, lock: LockMode, arrival: Arrival) -> Self {
        let permanent = arrival == Arrival::Permanent;
        Entry {
            owner,
            slot: Slot::Private(Box::new(Tranlocal::fork(committed, permanent))),
            lock,
            has_depart_obligation: arrival.has_depart_obligation(),
        }
    }

    /// The ref was created commit-locked with the creator arrived
    pub(crate) fn construction(owner: TxnRef<T>) -> Self {
        let id = owner.id();
        Entry {
            owner,
            slot: Slot::Private(Box::new(Tranlocal::constructed(id))),
            lock: LockMode::Commit,
            has_depart_obligation: true,
        }
    }

    pub(crate) fn commuting(owner: TxnRef<T>, f: CommuteFn<T>) -> Self {
        let id = owner.id();
        Entry {
            owner,
            slot: Slot::Private(Box::new(Tranlocal::commuting(id, f))),
            lock: LockMode::None,
            has_depart_obligation: false,
        }
    }

    pub(crate) fn tranlocal(&self) -> &Tranlocal<T> {
        match &self.slot {
            Slot::Read(committed) => committed,
            Slot::Private(private) => private,
        }
    }

    /// Fork a read into a private copy if needed and hand it out mutably
    pub(crate) fn make_private(&mut self) -> &mut Tranlocal<T> {
        if let Slot::Read(committed) = &self.slot {
            let permanent = !self.has_depart_obligation;
            self.slot = Slot::Private(Box::new(Tranlocal::fork(committed, permanent)));
        }
        match &mut self.slot {
            Slot::Private(private) => private,
            Slot::Read(_) => unreachable!("slot was made private above"),
        }
    }

    pub(crate) fn push_commuting(&mut self, f: CommuteFn<T>) {
        if let Slot::Private(private) = &mut self.slot {
            private.commuting_functions.push(f);
        }
    }

    fn base(&self) -> Option<&Arc<Tranlocal<T>>> {
        match &self.slot {
            Slot::Read(committed) => Some(committed),
            Slot::Private(private) => private.read.as_ref(),
        }
    }

    /// Lock (or upgrade) to `mode` and check the base is still current
    pub(crate) fn lock_and_validate(&mut self, owner: TxnId, spin: u32, mode: LockMode) -> Result<(), String> {
        if mode > self.lock {
            let orec = self.owner.orec();
            match orec.try_lock(spin, owner, mode, self.has_depart_obligation) {
                Some(obligation) => {
                    self.lock = mode;
                    self.has_depart_obligation = obligation;
                }
                None => {
                    return Err(format!(
                        "{} is locked by {}",
                        self.owner.id(),
                        describe_owner(orec.lock_owner())
                    ))
                }
            }
        }
        match self.base() {
            Some(base) if !self.owner.is_current(base) => {
                Err(format!("{} was updated by another transaction", self.owner.id()))
            }
            _ => Ok(()),
        }
    }

    /// First half of materializing a commute: arrive (and lock), then load the
    /// committed value the queued functions will run against
    pub(crate) fn load_for_commute(&mut self, owner: TxnId, spin: u32, mode: LockMode) -> Result<(), String> {
        let orec = self.owner.orec();
        let arrival = if mode.is_locked() {
            orec.arrive_and_lock(spin, owner, mode)
        } else {
            orec.arrive(spin)
        };
        if arrival == Arrival::Locked {
            return Err(format!(
                "{} is locked by {}",
                self.owner.id(),
                describe_owner(orec.lock_owner())
            ));
        }
        self.lock = mode;
        self.has_depart_obligation = arrival.has_depart_obligation();

        let Some(committed) = self.owner.load_committed() else {
            return Err(format!("{} has not been committed", self.owner.id()));
        };
        if let Slot::Private(private) = &mut self.slot {
            private.value = committed.value.clone();
            private.read = Some(committed);
            private.is_permanent = arrival == Arrival::Permanent;
        }
        Ok(())
    }

    /// Second half of materializing a commute
    pub(crate) fn evaluate_commuting(&mut self) {
        if let Slot::Private(private) = &mut self.slot {
            private.evaluate_commuting_functions();
        }
    }
}

fn describe_owner(owner: Option<TxnId>) -> String {
    owner.map_or_else(|| "another transaction".to_string(), |id| id.to_string())
}

impl<T: TxnValue> AttachedEntry for Entry<T> {
    fn ref_id(&self) -> RefId {
        self.owner.id()
    }

    fn kind(&self) -> EntryKind {
        match &self.slot {
            Slot::Read(_) => EntryKind::Read,
            Slot::Private(private) if private.is_commuting => EntryKind::Commuting,
            Slot::Private(private) if private.read.is_none() => EntryKind::Construction,
            Slot::Private(_) => EntryKind::Write,
        }
    }

    fn is_dirty(&self) -> bool {
        matches!(&self.slot, Slot::Private(private) if private.dirty == DirtyState::Dirty && !private.is_commuting)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn has_read_conflict(&self, owner: TxnId) -> bool {
        if self.lock.is_locked() {
            return false;
        }
        let base = match self.kind() {
            EntryKind::Read | EntryKind::Write => self.base(),
            EntryKind::Construction | EntryKind::Commuting => return false,
        };
        let Some(base) = base else {
            return false;
        };

        let orec = self.owner.orec();
        if orec.lock_mode() == LockMode::Commit && orec.lock_owner() != Some(owner) {
            return true;
        }
        !self.owner.is_current(base)
    }

    fn prepare(&mut self, ctx: &PrepareContext) -> Result<(), String> {
        let serializable = ctx.isolation == IsolationLevel::Serializable;
        match self.kind() {
            EntryKind::Read => {
                if serializable && !self.lock.is_locked() {
                    self.lock_and_validate(ctx.owner, ctx.spin, LockMode::Update)?;
                }
                Ok(())
            }
            EntryKind::Write => {
                let dirty = match &mut self.slot {
                    Slot::Private(private) if ctx.dirty_check => private.calculate_dirty(),
                    Slot::Private(private) => {
                        private.dirty = DirtyState::Dirty;
                        true
                    }
                    Slot::Read(_) => false,
                };
                if dirty {
                    self.lock_and_validate(ctx.owner, ctx.spin, LockMode::Commit)
                } else if serializable && !self.lock.is_locked() {
                    self.lock_and_validate(ctx.owner, ctx.spin, LockMode::Update)
                } else {
                    Ok(())
                }
            }
            EntryKind::Construction => {
                if let Slot::Private(private) = &mut self.slot {
                    private.dirty = DirtyState::Dirty;
                }
                Ok(())
            }
            EntryKind::Commuting => {
                self.load_for_commute(ctx.owner, ctx.spin, LockMode::Commit)?;
                self.evaluate_commuting();
                if ctx.dirty_check {
                    if let Slot::Private(private) = &mut self.slot {
                        private.calculate_dirty();
                    }
                }
                Ok(())
            }
        }
    }

    fn register_change_listener(&self, latch: &Arc<Latch>) -> Registration {
        let base = match self.kind() {
            EntryKind::Read | EntryKind::Write => self.base(),
            EntryKind::Construction | EntryKind::Commuting => None,
        };
        let Some(base) = base else {
            return Registration::None;
        };

        self.owner.orec().register_listener(Arc::clone(latch));
        if self.owner.is_current(base) {
            Registration::Done
        } else {
            latch.open();
            Registration::NotNeeded
        }
    }

    fn commit(self: Box<Self>, owner: TxnId, latches: &mut Latches) -> bool {
        let Entry {
            owner: reference,
            slot,
            lock,
            has_depart_obligation,
        } = *self;
        let orec = reference.orec();

        match slot {
            Slot::Private(private) if private.dirty == DirtyState::Dirty && !private.is_commuting => {
                debug_assert_eq!(lock, LockMode::Commit);
                reference.publish(Arc::new((*private).into_committed()));
                latches.extend(orec.take_listeners());
                orec.depart_after_update_and_unlock(owner, has_depart_obligation);
                true
            }
            _ => {
                match (lock.is_locked(), has_depart_obligation) {
                    (true, true) => {
                        orec.depart_after_reading_and_unlock(owner);
                    }
                    (true, false) => orec.unlock(owner),
                    (false, true) => {
                        orec.depart_after_reading();
                    }
                    (false, false) => {}
                }
                false
            }
        }
    }

    fn abort(self: Box<Self>, owner: TxnId) {
        release_after_failure(self.owner.orec(), owner, self.lock, self.has_depart_obligation);
    }
}
