//! Transaction-local snapshots of a ref
//!
//! A [`Tranlocal`] is either:
//! - committed: published as a ref's current value, immutable and shared by
//!   every reader through an `Arc`
//! - private: owned by one transaction, freely mutated until commit
//!   publishes it
//!
//! A private tranlocal remembers the committed one it was forked from in
//! `read`; a freshly constructed object has no base. Commuting tranlocals
//! carry a queue of deferred functions instead of a base until they are
//! materialized.

use orecstm_core::RefId;
use std::fmt;
use std::sync::Arc;

/// Payload a transactional ref can hold
///
/// `Default` is the value of a freshly constructed object, `PartialEq` drives
/// the dirty check.
pub trait TxnValue: Clone + PartialEq + Default + Send + Sync + 'static {}

impl<T> TxnValue for T where T: Clone + PartialEq + Default + Send + Sync + 'static {}

/// Deferred update queued by `commute`
pub type CommuteFn<T> = Box<dyn FnOnce(T) -> T + Send + Sync>;

/// Result of the dirty check on a private tranlocal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Not computed yet
    #[default]
    Unknown,
    /// Value differs from its base, or there is no base
    Dirty,
    /// Value equals its base; nothing to publish
    Clean,
}

/// Snapshot or working copy of one ref's value
pub struct Tranlocal<T: TxnValue> {
    owner: RefId,
    pub(crate) read: Option<Arc<Tranlocal<T>>>,
    /// The value
    pub value: T,
    pub(crate) is_committed: bool,
    pub(crate) is_permanent: bool,
    pub(crate) is_commuting: bool,
    pub(crate) dirty: DirtyState,
    pub(crate) commuting_functions: Vec<CommuteFn<T>>,
}

impl<T: TxnValue> Tranlocal<T> {
    /// Committed snapshot holding `value`
    pub(crate) fn committed(owner: RefId, value: T) -> Self {
        Tranlocal {
            owner,
            read: None,
            value,
            is_committed: true,
            is_permanent: false,
            is_commuting: false,
            dirty: DirtyState::Unknown,
            commuting_functions: Vec::new(),
        }
    }

    /// Private copy of `base`
    pub(crate) fn fork(base: &Arc<Tranlocal<T>>, permanent: bool) -> Self {
        Tranlocal {
            owner: base.owner,
            read: Some(Arc::clone(base)),
            value: base.value.clone(),
            is_committed: false,
            is_permanent: permanent,
            is_commuting: false,
            dirty: DirtyState::Unknown,
            commuting_functions: Vec::new(),
        }
    }

    /// Default-valued private tranlocal of a ref created in this transaction
    pub(crate) fn constructed(owner: RefId) -> Self {
        Tranlocal {
            owner,
            read: None,
            value: T::default(),
            is_committed: false,
            is_permanent: false,
            is_commuting: false,
            dirty: DirtyState::Dirty,
            commuting_functions: Vec::new(),
        }
    }

    /// Placeholder that only queues `f`
    pub(crate) fn commuting(owner: RefId, f: CommuteFn<T>) -> Self {
        Tranlocal {
            owner,
            read: None,
            value: T::default(),
            is_committed: false,
            is_permanent: false,
            is_commuting: true,
            dirty: DirtyState::Unknown,
            commuting_functions: vec![f],
        }
    }

    /// Ref this tranlocal belongs to
    pub fn owner(&self) -> RefId {
        self.owner
    }

    /// Committed tranlocal this one was forked from
    pub fn read(&self) -> Option<&Arc<Tranlocal<T>>> {
        self.read.as_ref()
    }

    /// Shared access to the value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value
    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    /// Published as a ref's committed value
    pub fn is_committed(&self) -> bool {
        self.is_committed
    }

    /// Forked from a read-biased orec; nothing to depart
    pub fn is_permanent(&self) -> bool {
        self.is_permanent
    }

    /// Still a deferred commute
    pub fn is_commuting(&self) -> bool {
        self.is_commuting
    }

    /// Last dirty check result
    pub fn dirty(&self) -> DirtyState {
        self.dirty
    }

    /// Number of queued commuting functions
    pub fn commuting_count(&self) -> usize {
        self.commuting_functions.len()
    }

    /// Compare against the base and record the result
    pub(crate) fn calculate_dirty(&mut self) -> bool {
        let dirty = match &self.read {
            None => true,
            Some(base) => base.value != self.value,
        };
        self.dirty = if dirty { DirtyState::Dirty } else { DirtyState::Clean };
        dirty
    }

    /// Apply queued commuting functions in call order
    ///
    /// A panicking function leaves the tranlocal half-applied; the caller
    /// aborts the transaction.
    pub(crate) fn evaluate_commuting_functions(&mut self) {
        for f in std::mem::take(&mut self.commuting_functions) {
            let current = std::mem::take(&mut self.value);
            self.value = f(current);
        }
        self.is_commuting = false;
        self.dirty = DirtyState::Dirty;
    }

    /// Turn a private tranlocal into a committed snapshot
    pub(crate) fn into_committed(mut self) -> Self {
        self.is_committed = true;
        self.read = None;
        self.is_commuting = false;
        self.commuting_functions.clear();
        self
    }
}

impl<T: TxnValue + fmt::Debug> fmt::Debug for Tranlocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tranlocal")
            .field("owner", &self.owner)
            .field("value", &self.value)
            .field("has_read", &self.read.is_some())
            .field("is_committed", &self.is_committed)
            .field("is_permanent", &self.is_permanent)
            .field("is_commuting", &self.is_commuting)
            .field("dirty", &self.dirty)
            .field("commuting_functions", &self.commuting_functions.len())
            .finish()
    }
}
