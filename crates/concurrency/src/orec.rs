//! Ownership record (orec) for a transactional reference
//!
//! Every ref owns one [`Orec`]. It combines, in a single atomic word:
//! - the lock (`None`, `Update` or `Commit`)
//! - the surplus: number of transactions that arrived and have not departed
//! - the bias: update-biased or read-biased
//! - the readonly count: consecutive read-only departures since the last
//!   write
//!
//! # Bias
//!
//! An update-biased orec charges every reader an arrive and a depart. Once
//! [`READ_BIASED_THRESHOLD`] read-only departures happen in a row with no
//! write in between, the orec turns read-biased: its surplus becomes
//! permanent, arrivals no longer increment it and readers never depart. The
//! next committed write demotes it back to update-biased.
//!
//! # Word layout
//!
//! ```text
//!  63 62 | 61          | 60 ............ 10 | 9 ........ 0
//!  lock  | read-biased | surplus            | readonly count
//! ```
//!
//! # Thread Safety
//!
//! All state transitions are compare-and-swap loops on the packed word. The
//! lock owner is kept in a separate atomic and only read by the owner itself
//! (re-entrancy) and by diagnostics. Listener latches sit behind a
//! `parking_lot::Mutex`; they are only touched by blocking retry and by
//! committing writers.

use orecstm_core::{Latch, LockMode, TxnId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Consecutive read-only departures that turn an orec read-biased
pub const READ_BIASED_THRESHOLD: u64 = 16;

const LOCK_SHIFT: u32 = 62;
const LOCK_MASK: u64 = 0b11 << LOCK_SHIFT;
const READ_BIASED_BIT: u64 = 1 << 61;
const SURPLUS_SHIFT: u32 = 10;
const SURPLUS_MASK: u64 = ((1u64 << 51) - 1) << SURPLUS_SHIFT;
const READONLY_MASK: u64 = (1u64 << SURPLUS_SHIFT) - 1;

/// Largest value the readonly count field can hold
pub const READONLY_COUNT_MAX: u64 = READONLY_MASK;

// =============================================================================
// Packed word helpers
// =============================================================================

#[inline]
fn lock_of(word: u64) -> LockMode {
    match (word & LOCK_MASK) >> LOCK_SHIFT {
        0 => LockMode::None,
        1 => LockMode::Update,
        _ => LockMode::Commit,
    }
}

#[inline]
fn with_lock(word: u64, mode: LockMode) -> u64 {
    let bits = match mode {
        LockMode::None => 0,
        LockMode::Update => 1,
        LockMode::Commit => 2,
    };
    (word & !LOCK_MASK) | (bits << LOCK_SHIFT)
}

#[inline]
fn surplus_of(word: u64) -> u64 {
    (word & SURPLUS_MASK) >> SURPLUS_SHIFT
}

#[inline]
fn with_surplus(word: u64, surplus: u64) -> u64 {
    (word & !SURPLUS_MASK) | ((surplus << SURPLUS_SHIFT) & SURPLUS_MASK)
}

#[inline]
fn readonly_of(word: u64) -> u64 {
    word & READONLY_MASK
}

#[inline]
fn with_readonly(word: u64, count: u64) -> u64 {
    (word & !READONLY_MASK) | (count & READONLY_MASK)
}

#[inline]
fn is_biased(word: u64) -> bool {
    word & READ_BIASED_BIT != 0
}

/// Point-in-time view of an orec's packed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrecSnapshot {
    /// Lock currently held
    pub lock_mode: LockMode,
    /// Arrived parties (permanent 0 or 1 when read-biased)
    pub surplus: u64,
    /// Read-biased mode
    pub read_biased: bool,
    /// Consecutive read-only departures
    pub readonly_count: u64,
}

impl OrecSnapshot {
    fn from_word(word: u64) -> Self {
        OrecSnapshot {
            lock_mode: lock_of(word),
            surplus: surplus_of(word),
            read_biased: is_biased(word),
            readonly_count: readonly_of(word),
        }
    }

    /// Unlocked and, unless read-biased, without surplus
    pub fn is_quiescent(&self) -> bool {
        self.lock_mode == LockMode::None && (self.surplus == 0 || self.read_biased)
    }
}

/// Outcome of an arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Surplus incremented; the caller must depart later
    Normal,
    /// Orec is read-biased; nothing to depart
    Permanent,
    /// Blocked by a lock held by someone else, nothing changed
    Locked,
}

impl Arrival {
    /// Whether the arrival left the caller with a depart obligation
    pub fn has_depart_obligation(&self) -> bool {
        matches!(self, Arrival::Normal)
    }
}

// =============================================================================
// Orec
// =============================================================================

/// Ownership record: lock, surplus, bias and listener set of one ref
#[derive(Debug, Default)]
pub struct Orec {
    state: AtomicU64,
    lock_owner: AtomicU64,
    listeners: Mutex<Vec<Arc<Latch>>>,
}

impl Orec {
    /// Create a free, update-biased orec
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an orec that is already commit-locked by `owner` with one
    /// arrived party, used for refs constructed inside a transaction
    pub fn new_locked(owner: TxnId) -> Self {
        let word = with_surplus(with_lock(0, LockMode::Commit), 1);
        Orec {
            state: AtomicU64::new(word),
            lock_owner: AtomicU64::new(owner.as_u64()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    fn load(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    #[inline]
    fn cas(&self, current: u64, next: u64) -> bool {
        self.state
            .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // -------------------------------------------------------------------------
    // Arrive
    // -------------------------------------------------------------------------

    /// Register interest in this orec
    ///
    /// Only a commit lock blocks an arrival. A blocked arrival is retried up
    /// to `spin` times before [`Arrival::Locked`] is returned.
    pub fn arrive(&self, spin: u32) -> Arrival {
        let mut remaining = spin;
        loop {
            let current = self.load();
            if lock_of(current) == LockMode::Commit {
                if remaining == 0 {
                    return Arrival::Locked;
                }
                remaining -= 1;
                std::hint::spin_loop();
                continue;
            }

            let surplus = surplus_of(current);
            if is_biased(current) {
                if surplus > 0 {
                    return Arrival::Permanent;
                }
                if self.cas(current, with_surplus(current, 1)) {
                    return Arrival::Permanent;
                }
                continue;
            }

            if self.cas(current, with_surplus(current, surplus + 1)) {
                return Arrival::Normal;
            }
        }
    }

    /// Arrive and take `mode` in one step
    ///
    /// Fails with [`Arrival::Locked`] if any lock is held.
    ///
    /// # Arguments
    /// * `spin` - retries while the orec is locked
    /// * `owner` - transaction taking the lock
    /// * `mode` - `Update` or `Commit`
    pub fn arrive_and_lock(&self, spin: u32, owner: TxnId, mode: LockMode) -> Arrival {
        debug_assert!(mode.is_locked());
        let mut remaining = spin;
        loop {
            let current = self.load();
            if lock_of(current).is_locked() {
                if remaining == 0 {
                    return Arrival::Locked;
                }
                remaining -= 1;
                std::hint::spin_loop();
                continue;
            }

            let surplus = surplus_of(current);
            let (next, arrival) = if is_biased(current) {
                (with_surplus(current, surplus.max(1)), Arrival::Permanent)
            } else {
                (with_surplus(current, surplus + 1), Arrival::Normal)
            };
            if self.cas(current, with_lock(next, mode)) {
                self.lock_owner.store(owner.as_u64(), Ordering::Release);
                return arrival;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lock
    // -------------------------------------------------------------------------

    /// Lock an orec the caller has already arrived at
    ///
    /// Re-entrant for the same owner; a held `Update` lock is upgraded to
    /// `Commit` on request, a lock is never downgraded. Returns `None`
    /// without changing anything when another transaction holds the lock.
    ///
    /// A caller without a depart obligation (it arrived while the orec was
    /// read-biased) that finds the orec demoted is registered as a surplus
    /// party while locking, so `surplus == 0` never coexists with a held
    /// lock.
    ///
    /// # Returns
    /// `Some(obligation)`: the caller's depart obligation after locking.
    pub fn try_lock(
        &self,
        spin: u32,
        owner: TxnId,
        mode: LockMode,
        has_depart_obligation: bool,
    ) -> Option<bool> {
        debug_assert!(mode.is_locked());
        let mut remaining = spin;
        loop {
            let current = self.load();
            let held = lock_of(current);

            if held.is_locked() {
                if self.lock_owner.load(Ordering::Acquire) == owner.as_u64() {
                    if held >= mode {
                        return Some(has_depart_obligation);
                    }
                    if self.cas(current, with_lock(current, mode)) {
                        return Some(has_depart_obligation);
                    }
                    continue;
                }
                if remaining == 0 {
                    return None;
                }
                remaining -= 1;
                std::hint::spin_loop();
                continue;
            }

            let register = !has_depart_obligation && !is_biased(current);
            let mut next = with_lock(current, mode);
            if register {
                next = with_surplus(next, surplus_of(current) + 1);
            }
            if self.cas(current, next) {
                self.lock_owner.store(owner.as_u64(), Ordering::Release);
                return Some(has_depart_obligation || register);
            }
        }
    }

    /// Release a lock held by `owner` without departing
    pub fn unlock(&self, owner: TxnId) {
        debug_assert_eq!(self.lock_owner.load(Ordering::Acquire), owner.as_u64());
        self.lock_owner.store(0, Ordering::Release);
        loop {
            let current = self.load();
            debug_assert!(lock_of(current).is_locked());
            if self.cas(current, with_lock(current, LockMode::None)) {
                return;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Depart
    // -------------------------------------------------------------------------

    /// Depart after a read-only use of an unlocked, update-biased orec
    ///
    /// Increments the readonly count. Returns true when this departure
    /// promoted the orec to read-biased.
    pub fn depart_after_reading(&self) -> bool {
        self.depart_read(None)
    }

    /// Depart after a read-only use and release the lock held by `owner`
    ///
    /// Returns true when the orec became read-biased.
    pub fn depart_after_reading_and_unlock(&self, owner: TxnId) -> bool {
        self.depart_read(Some(owner))
    }

    fn depart_read(&self, owner: Option<TxnId>) -> bool {
        if owner.is_some() {
            self.lock_owner.store(0, Ordering::Release);
        }
        loop {
            let current = self.load();
            debug_assert!(!is_biased(current), "read-biased orecs have no readers to depart");
            let surplus = surplus_of(current);
            debug_assert!(surplus > 0, "depart without arrive");
            let surplus = surplus.saturating_sub(1);

            let mut next = with_surplus(current, surplus);
            if owner.is_some() {
                next = with_lock(next, LockMode::None);
            }

            let count = (readonly_of(current) + 1).min(READONLY_COUNT_MAX);
            let promote =
                surplus == 0 && count >= READ_BIASED_THRESHOLD && !lock_of(next).is_locked();
            next = if promote {
                with_readonly(next, 0) | READ_BIASED_BIT
            } else {
                with_readonly(next, count)
            };

            if self.cas(current, next) {
                if promote {
                    trace!(readonly_count = count, "orec promoted to read-biased");
                }
                return promote;
            }
        }
    }

    /// Depart after publishing a write and release the commit lock
    ///
    /// Resets the readonly count. A read-biased orec loses its permanent
    /// surplus and is demoted to update-biased.
    ///
    /// # Returns
    /// The surplus left behind.
    pub fn depart_after_update_and_unlock(&self, owner: TxnId, has_depart_obligation: bool) -> u64 {
        self.lock_owner.store(0, Ordering::Release);
        loop {
            let current = self.load();
            debug_assert_eq!(lock_of(current), LockMode::Commit);
            let biased = is_biased(current);
            let surplus = if biased {
                0
            } else if has_depart_obligation {
                surplus_of(current).saturating_sub(1)
            } else {
                surplus_of(current)
            };

            let next = with_readonly(
                with_lock(with_surplus(current, surplus), LockMode::None) & !READ_BIASED_BIT,
                0,
            );
            if self.cas(current, next) {
                if biased {
                    trace!(owner = %owner, "orec demoted to update-biased");
                }
                return surplus;
            }
        }
    }

    /// Depart after an abort; a read-biased orec keeps its surplus
    pub fn depart_after_failure(&self) {
        loop {
            let current = self.load();
            if is_biased(current) {
                return;
            }
            let surplus = surplus_of(current);
            debug_assert!(surplus > 0, "depart without arrive");
            if self.cas(current, with_surplus(current, surplus.saturating_sub(1))) {
                return;
            }
        }
    }

    /// Depart after an abort and release the lock held by `owner`
    pub fn depart_after_failure_and_unlock(&self, owner: TxnId) {
        debug_assert_eq!(self.lock_owner.load(Ordering::Acquire), owner.as_u64());
        self.lock_owner.store(0, Ordering::Release);
        loop {
            let current = self.load();
            let mut next = with_lock(current, LockMode::None);
            if !is_biased(current) {
                next = with_surplus(next, surplus_of(current).saturating_sub(1));
            }
            if self.cas(current, next) {
                return;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Atomic view of lock, surplus, bias and readonly count
    pub fn snapshot(&self) -> OrecSnapshot {
        OrecSnapshot::from_word(self.load())
    }

    /// Arrived parties
    pub fn surplus(&self) -> u64 {
        surplus_of(self.load())
    }

    /// Whether the orec is read-biased
    pub fn is_read_biased(&self) -> bool {
        is_biased(self.load())
    }

    /// Lock currently held
    pub fn lock_mode(&self) -> LockMode {
        lock_of(self.load())
    }

    /// Consecutive read-only departures since the last write
    pub fn readonly_count(&self) -> u64 {
        readonly_of(self.load())
    }

    /// Current lock holder, if any
    pub fn lock_owner(&self) -> Option<TxnId> {
        TxnId::from_raw(self.lock_owner.load(Ordering::Acquire))
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Register a latch to be opened by the next committed write
    ///
    /// Latches that were already opened elsewhere are dropped from the set.
    pub fn register_listener(&self, latch: Arc<Latch>) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|l| !l.is_open());
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &latch)) {
            listeners.push(latch);
        }
    }

    /// Remove and return every registered latch
    pub fn take_listeners(&self) -> Vec<Arc<Latch>> {
        std::mem::take(&mut *self.listeners.lock())
    }

    /// Number of registered latches
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
