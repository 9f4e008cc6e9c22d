//! Transactions
//!
//! This module provides:
//! - [`Transaction`]: the state machine every read, write, commute and
//!   commit goes through
//! - Thread-local transaction pooling ([`TransactionPool`])
//!
//! # Lifecycle
//!
//! ```text
//! Active ──prepare──▶ Prepared ──commit──▶ Committed
//!   │                    │
//!   └──────abort─────────┴──────────────▶ Aborted
//! ```
//!
//! A dead transaction (committed or aborted) can be recycled with
//! [`Transaction::soft_reset`] (next attempt of the same logical
//! transaction) or [`Transaction::hard_reset`].
//!
//! # Failure handling
//!
//! Every error except `DeadTransaction` is returned after the transaction
//! ran its single abort routine: all locks released, all surplus departed,
//! attached set discarded. Panics from user callbacks (commute functions,
//! lifecycle listeners) go through the same routine before being resumed.
//!
//! # Architecture
//!
//! - `open.rs`: open for read/write/construction, commute
//! - `commit.rs`: prepare, commit, abort, blocking retry
//! - `pool.rs`: thread-local pool

mod commit;
mod open;
pub mod pool;

pub use pool::{TransactionPool, MAX_POOL_SIZE};

use crate::attached::AttachedSet;
use crate::entry::{AttachedEntry, Entry, EntryKind};
use crate::factory::TransactionFactory;
use crate::reference::TxnRef;
use crate::speculative::{AttachedSetKind, SpeculativeConfig};
use crate::stm::StmShared;
use crate::tranlocal::{Tranlocal, TxnValue};
use orecstm_concurrency::LocalConflictCounter;
use orecstm_core::{
    ListenerRef, RefId, Result, StmError, TransactionConfig, TransactionLifecycleEvent,
    TransactionStatus, TxnId,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A software transaction
///
/// Not shared between threads while running; all shared state lives in the
/// refs' orecs and committed snapshots.
pub struct Transaction {
    id: TxnId,
    shared: Arc<StmShared>,
    config: Arc<TransactionConfig>,
    speculative: Arc<SpeculativeConfig>,
    status: TransactionStatus,
    attached: AttachedSet,
    /// Committed snapshots read without attaching, one per ref; kept alive
    /// for the references handed out
    untracked: FxHashMap<RefId, Arc<dyn Any + Send + Sync>>,
    local_conflict_counter: LocalConflictCounter,
    has_reads: bool,
    has_untracked_reads: bool,
    attempt: u32,
    abort_only: bool,
    normal_listeners: Vec<ListenerRef>,
    permanent_listeners: Vec<ListenerRef>,
}

impl Transaction {
    pub(crate) fn new(factory: &TransactionFactory) -> Self {
        let kind = factory.speculative.attached_set_kind();
        Transaction {
            id: TxnId::next(),
            shared: Arc::clone(&factory.shared),
            config: Arc::clone(&factory.config),
            speculative: Arc::clone(&factory.speculative),
            status: TransactionStatus::Active,
            attached: AttachedSet::new(kind, factory.config.max_array_size),
            untracked: FxHashMap::default(),
            local_conflict_counter: LocalConflictCounter::default(),
            has_reads: false,
            has_untracked_reads: false,
            attempt: 1,
            abort_only: false,
            normal_listeners: Vec::new(),
            permanent_listeners: Vec::new(),
        }
    }

    /// Re-initialise every field for a new family, keeping allocations
    ///
    /// A live transaction is rolled back first, without notifying listeners.
    pub fn init(&mut self, factory: &TransactionFactory) {
        if self.status.is_alive() {
            self.abort_internal(false);
        }
        self.shared = Arc::clone(&factory.shared);
        self.config = Arc::clone(&factory.config);
        self.speculative = Arc::clone(&factory.speculative);
        self.permanent_listeners.clear();
        self.attempt = 1;
        self.restart();
    }

    /// Common part of every reset: fresh identity and empty bookkeeping
    fn restart(&mut self) {
        self.id = TxnId::next();
        self.status = TransactionStatus::Active;
        let kind = self.speculative.attached_set_kind();
        self.attached.reset(kind, self.config.max_array_size);
        self.untracked.clear();
        self.local_conflict_counter = LocalConflictCounter::default();
        self.has_reads = false;
        self.has_untracked_reads = false;
        self.abort_only = false;
        self.normal_listeners.clear();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identity of the current attempt
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Family configuration
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Attempt number, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Snapshot of the global conflict counter this transaction validated
    /// against last
    pub fn local_conflict_counter(&self) -> u64 {
        self.local_conflict_counter.get()
    }

    /// Whether `set_abort_only` was called
    pub fn is_abort_only(&self) -> bool {
        self.abort_only
    }

    /// Number of attached refs
    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Number of distinct refs read without attaching
    pub fn untracked_count(&self) -> usize {
        self.untracked.len()
    }

    /// Backing currently used for the attached set
    pub fn attached_set_kind(&self) -> AttachedSetKind {
        self.attached.kind()
    }

    /// Whether an untracked read happened in this attempt
    pub fn has_untracked_reads(&self) -> bool {
        self.has_untracked_reads
    }

    /// How `r` is attached, if it is
    pub fn attached_kind<T: TxnValue>(&self, r: &TxnRef<T>) -> Option<EntryKind> {
        self.attached.get(r.id()).map(|e| e.kind())
    }

    /// Tranlocal attached for `r`, if any
    pub fn get<T: TxnValue>(&self, r: &TxnRef<T>) -> Option<&Tranlocal<T>> {
        self.attached
            .get(r.id())
            .and_then(|e| e.as_any().downcast_ref::<Entry<T>>())
            .map(Entry::tranlocal)
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Doom the transaction: prepare and commit will fail with a conflict
    pub fn set_abort_only(&mut self) -> Result<()> {
        self.check_active("set_abort_only")?;
        self.abort_only = true;
        Ok(())
    }

    /// Register a listener cleared by the next reset
    pub fn register_lifecycle_listener(&mut self, listener: ListenerRef) -> Result<()> {
        self.check_alive("register_lifecycle_listener")?;
        self.normal_listeners.push(listener);
        Ok(())
    }

    /// Register a listener that survives soft resets
    pub fn register_permanent_lifecycle_listener(&mut self, listener: ListenerRef) -> Result<()> {
        self.check_alive("register_permanent_lifecycle_listener")?;
        self.permanent_listeners.push(listener);
        Ok(())
    }

    /// Start the next attempt of the same logical transaction
    ///
    /// A live transaction is aborted first. Keeps permanent listeners and the
    /// attempt count grows by one.
    ///
    /// # Returns
    /// `false` once the retry budget is used up; the transaction then stays
    /// dead.
    pub fn soft_reset(&mut self) -> bool {
        if self.status.is_alive() {
            self.abort_internal(true);
        }
        if self.attempt >= self.config.max_retries {
            return false;
        }
        self.attempt += 1;
        self.restart();
        true
    }

    /// Start over as a brand new transaction of the same family
    ///
    /// A live transaction is aborted first. Clears permanent listeners and
    /// resets the attempt count to 1.
    pub fn hard_reset(&mut self) {
        if self.status.is_alive() {
            self.abort_internal(true);
        }
        self.permanent_listeners.clear();
        self.attempt = 1;
        self.restart();
    }

    // =========================================================================
    // Internals shared by open and commit
    // =========================================================================

    /// Mutating operations need an active transaction; a prepared one is
    /// aborted
    fn check_active(&mut self, op: &str) -> Result<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Prepared => Err(self.fail(StmError::PreparedTransaction(format!(
                "{op} on prepared transaction {}",
                self.id
            )))),
            TransactionStatus::Committed | TransactionStatus::Aborted => {
                Err(self.dead(op))
            }
        }
    }

    fn check_alive(&self, op: &str) -> Result<()> {
        if self.status.is_dead() {
            return Err(self.dead(op));
        }
        Ok(())
    }

    fn dead(&self, op: &str) -> StmError {
        StmError::DeadTransaction(format!("{op} on {} transaction {}", self.status, self.id))
    }

    /// Abort (if still alive) and hand back `err`
    fn fail(&mut self, err: StmError) -> StmError {
        if self.status.is_alive() {
            debug!(
                txn_id = %self.id,
                family = %self.config.family_name,
                reason = %err,
                "transaction aborted"
            );
            self.abort_internal(true);
        }
        err
    }

    fn conflict(&mut self, reason: String) -> StmError {
        self.fail(StmError::ReadWriteConflict(reason))
    }

    /// The one cleanup path: release every attached entry and go Aborted
    fn abort_internal(&mut self, notify: bool) {
        let owner = self.id;
        for entry in self.attached.drain() {
            entry.abort(owner);
        }
        self.untracked.clear();
        self.status = TransactionStatus::Aborted;
        if notify {
            self.fire(TransactionLifecycleEvent::PostAbort);
        }
    }

    /// Notify permanent listeners, then normal ones
    ///
    /// A panicking listener aborts a live transaction before the panic
    /// continues.
    fn fire(&mut self, event: TransactionLifecycleEvent) {
        if self.permanent_listeners.is_empty() && self.normal_listeners.is_empty() {
            return;
        }
        let listeners: SmallVec<[ListenerRef; 4]> = self
            .permanent_listeners
            .iter()
            .chain(self.normal_listeners.iter())
            .cloned()
            .collect();
        let id = self.id;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for listener in &listeners {
                listener.notify(id, event);
            }
        }));
        if let Err(payload) = outcome {
            if self.status.is_alive() {
                self.abort_internal(false);
            }
            panic::resume_unwind(payload);
        }
    }

    /// Run a user callback; a panic aborts the transaction and is resumed
    fn guard_user_code<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(result) => result,
            Err(payload) => {
                if self.status.is_alive() {
                    self.abort_internal(true);
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn entry<T: TxnValue>(&self, id: RefId) -> &Entry<T> {
        match self
            .attached
            .get(id)
            .and_then(|e| e.as_any().downcast_ref::<Entry<T>>())
        {
            Some(entry) => entry,
            None => unreachable!("{id} is attached with another value type"),
        }
    }

    fn entry_mut<T: TxnValue>(&mut self, id: RefId) -> &mut Entry<T> {
        match self
            .attached
            .get_mut(id)
            .and_then(|e| e.as_any_mut().downcast_mut::<Entry<T>>())
        {
            Some(entry) => entry,
            None => unreachable!("{id} is attached with another value type"),
        }
    }

    /// Add an entry, failing speculatively when the backing is full
    fn attach(&mut self, entry: Box<dyn AttachedEntry>) -> Result<()> {
        match self.attached.insert(entry) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                rejected.abort(self.id);
                let required = self.attached.len() + 1;
                self.speculative.signal_required(required);
                Err(self.fail(StmError::SpeculativeConfiguration { required }))
            }
        }
    }

    /// Snapshot the global counter on the first read of an attempt
    fn start_reading(&mut self) {
        if !self.has_reads {
            self.local_conflict_counter.reset(&self.shared.counter);
            self.has_reads = true;
        }
    }

    /// Whether anything this transaction read was overwritten
    ///
    /// Cheap when the global counter has not moved. Otherwise every attached
    /// entry is re-validated; if they all still hold, the change was caused
    /// by an unrelated ref and the local snapshot has been advanced.
    fn has_read_conflict(&mut self) -> bool {
        if self.config.is_read_validation_disabled() {
            return false;
        }
        if self.has_untracked_reads {
            return self
                .local_conflict_counter
                .sync_and_check_conflict(&self.shared.counter);
        }
        if self.attached.is_empty() {
            return false;
        }
        if !self
            .local_conflict_counter
            .sync_and_check_conflict(&self.shared.counter)
        {
            return false;
        }
        let owner = self.id;
        self.attached.iter().any(|e| e.has_read_conflict(owner))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status.is_alive() {
            warn!(
                txn_id = %self.id,
                family = %self.config.family_name,
                status = %self.status,
                "transaction dropped while alive, rolling back"
            );
            self.abort_internal(false);
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("family", &self.config.family_name)
            .field("status", &self.status)
            .field("attempt", &self.attempt)
            .field("attached", &self.attached.len())
            .field("attached_set_kind", &self.attached.kind())
            .field("untracked", &self.untracked.len())
            .field("abort_only", &self.abort_only)
            .finish()
    }
}
