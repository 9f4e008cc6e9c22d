//! Two-phase commit, abort and blocking retry
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. PrePrepare listeners
//! 2. abort-only check
//! 3. per entry: lock dirty writes (Commit), validate their base,
//!    materialize commutes; Serializable also locks and validates reads
//! 4. status = Prepared, PostPrepare listeners
//! 5. PreCommit listeners
//! 6. signal the global conflict counter once per dirty entry
//! 7. publish dirty entries, release everything
//! 8. status = Committed, open collected latches, PostCommit listeners
//! ```
//!
//! Locks taken in step 3 are held until step 7, so a concurrent reader sees
//! either all old or all new values, or fails on the lock.

use super::Transaction;
use crate::entry::{Latches, PrepareContext, Registration};
use orecstm_core::{Latch, Result, StmError, TransactionLifecycleEvent, TransactionStatus};
use std::sync::Arc;
use tracing::trace;

impl Transaction {
    /// Acquire every lock commit needs and validate
    ///
    /// Idempotent once prepared.
    ///
    /// # Errors
    /// `ReadWriteConflict` (transaction aborted) when a lock is held by
    /// someone else, a written ref changed since it was read, a
    /// Serializable read is stale, or the transaction is abort-only.
    pub fn prepare(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Prepared => return Ok(()),
            TransactionStatus::Committed | TransactionStatus::Aborted => {
                return Err(self.dead("prepare"))
            }
            TransactionStatus::Active => {}
        }

        self.fire(TransactionLifecycleEvent::PrePrepare);
        if self.abort_only {
            return Err(self.conflict(format!("transaction {} is abort-only", self.id)));
        }

        let ctx = PrepareContext {
            owner: self.id,
            spin: self.config.spin_count,
            dirty_check: self.config.dirty_check_enabled,
            isolation: self.config.isolation_level,
        };
        let failure = self.guard_user_code(|tx| {
            tx.attached
                .iter_mut()
                .find_map(|entry| entry.prepare(&ctx).err())
        });
        if let Some(reason) = failure {
            return Err(self.conflict(reason));
        }

        self.status = TransactionStatus::Prepared;
        self.fire(TransactionLifecycleEvent::PostPrepare);
        Ok(())
    }

    /// Prepare if needed, then publish every dirty write
    ///
    /// Committing a committed transaction does nothing.
    ///
    /// # Errors
    /// - `DeadTransaction` on an aborted transaction
    /// - any error of [`Transaction::prepare`]
    pub fn commit(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Committed => return Ok(()),
            TransactionStatus::Aborted => return Err(self.dead("commit")),
            TransactionStatus::Active => self.prepare()?,
            TransactionStatus::Prepared => {}
        }

        self.fire(TransactionLifecycleEvent::PreCommit);

        let owner = self.id;
        let entries = self.attached.drain();
        let writes = entries.iter().filter(|e| e.is_dirty()).count();
        for _ in 0..writes {
            self.shared.counter.signal();
        }

        let mut latches = Latches::new();
        for entry in entries {
            entry.commit(owner, &mut latches);
        }
        self.untracked.clear();
        self.status = TransactionStatus::Committed;
        trace!(
            txn_id = %owner,
            family = %self.config.family_name,
            writes,
            latches = latches.len(),
            "write-back complete"
        );

        for latch in &latches {
            latch.open();
        }
        self.fire(TransactionLifecycleEvent::PostCommit);
        Ok(())
    }

    /// Release everything and discard all changes
    ///
    /// Aborting an aborted transaction does nothing.
    ///
    /// # Errors
    /// `DeadTransaction` on a committed transaction.
    pub fn abort(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Aborted => Ok(()),
            TransactionStatus::Committed => Err(self.dead("abort")),
            TransactionStatus::Active | TransactionStatus::Prepared => {
                self.abort_internal(true);
                Ok(())
            }
        }
    }

    /// Arrange for `latch` to open when anything this transaction read or
    /// wrote changes, then abort
    ///
    /// If a watched ref already changed the latch is opened right away.
    /// Waiting on the latch is up to the caller; afterwards the next attempt
    /// starts with [`Transaction::soft_reset`].
    ///
    /// # Errors
    /// `NoRetryPossible` (transaction aborted) when blocking is not allowed
    /// or nothing attached can be watched: pure commutes and constructions
    /// don't count.
    pub fn register_change_listener_and_abort(&mut self, latch: &Arc<Latch>) -> Result<()> {
        self.check_active("register_change_listener_and_abort")?;
        if !self.config.blocking_allowed {
            let family = self.config.family_name.clone();
            return Err(self.fail(StmError::NoRetryPossible(format!(
                "blocking is not allowed for family '{family}'"
            ))));
        }
        if self.attached.is_empty() {
            return Err(self.fail(StmError::NoRetryPossible(format!(
                "transaction {} has no tracked reads to wait on",
                self.id
            ))));
        }

        let mut registered = false;
        for entry in self.attached.iter() {
            match entry.register_change_listener(latch) {
                Registration::Done => registered = true,
                Registration::NotNeeded => {
                    registered = true;
                    break;
                }
                Registration::None => {}
            }
        }
        if !registered {
            return Err(self.fail(StmError::NoRetryPossible(format!(
                "transaction {} only commuted or constructed refs",
                self.id
            ))));
        }

        self.abort_internal(true);
        Ok(())
    }
}
