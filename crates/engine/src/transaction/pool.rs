//! Thread-local transaction pooling
//!
//! Each thread keeps up to [`MAX_POOL_SIZE`] dead transactions. A pooled
//! transaction is re-initialised (not reallocated) when handed out again,
//! so its attached-set and listener allocations are reused.
//!
//! # Thread Safety
//!
//! The pool is thread-local; no synchronization is involved.

use super::Transaction;
use crate::factory::TransactionFactory;
use std::cell::RefCell;

/// Maximum idle transactions kept per thread
pub const MAX_POOL_SIZE: usize = 8;

thread_local! {
    static POOL: RefCell<Vec<Transaction>> = RefCell::new(Vec::with_capacity(MAX_POOL_SIZE));
}

/// Per-thread pool of reusable transactions
pub struct TransactionPool;

impl TransactionPool {
    /// Take a transaction from this thread's pool, or create one
    ///
    /// The transaction is fully re-initialised for `factory`: new id,
    /// active, attempt 1, no listeners, empty attached set.
    pub fn acquire(factory: &TransactionFactory) -> Transaction {
        let pooled = POOL.with(|pool| pool.borrow_mut().pop());
        match pooled {
            Some(mut tx) => {
                tx.init(factory);
                tx
            }
            None => factory.new_transaction(),
        }
    }

    /// Return a transaction to this thread's pool
    ///
    /// A live transaction is rolled back without notifying listeners. The
    /// transaction is dropped if the pool is full.
    pub fn release(mut tx: Transaction) {
        if tx.status.is_alive() {
            tx.abort_internal(false);
        }
        tx.normal_listeners.clear();
        tx.permanent_listeners.clear();
        POOL.with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < MAX_POOL_SIZE {
                pool.push(tx);
            }
        });
    }

    /// Idle transactions in this thread's pool
    pub fn pool_size() -> usize {
        POOL.with(|pool| pool.borrow().len())
    }

    /// Fill this thread's pool with up to `count` transactions
    pub fn warmup(factory: &TransactionFactory, count: usize) {
        let missing = count.min(MAX_POOL_SIZE).saturating_sub(Self::pool_size());
        for _ in 0..missing {
            Self::release(factory.new_transaction());
        }
    }

    /// Drop every idle transaction of this thread
    pub fn clear() {
        POOL.with(|pool| pool.borrow_mut().clear());
    }
}
