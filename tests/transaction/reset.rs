//! Reset And Retry Tests

use crate::common::*;
use orecstm::{
    LockMode, Stm, StmError, TransactionLifecycleEvent, TransactionPool, TransactionStatus, TxnId,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn soft_reset_starts_next_attempt() {
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut tx = stm.new_transaction();
    let first = tx.id();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 1;
    commit_write(&stm, &r, 5);
    assert_conflict(tx.commit().unwrap_err());

    assert!(tx.soft_reset());
    assert_eq!(tx.status(), TransactionStatus::Active);
    assert_eq!(tx.attempt(), 2);
    assert_ne!(tx.id(), first);
    assert_eq!(tx.attached_count(), 0);

    tx.open_for_write(&r, LockMode::None).unwrap().value += 1;
    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(6));
}

#[test]
fn retry_budget_is_bounded() {
    let stm = Stm::builder().max_retries(2).build().unwrap();
    let mut tx = stm.new_transaction();
    tx.abort().unwrap();

    assert!(tx.soft_reset());
    assert_eq!(tx.attempt(), 2);
    assert!(!tx.soft_reset());
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert!(matches!(
        tx.open_for_read(&stm.new_ref(0u64), LockMode::None).unwrap_err(),
        StmError::DeadTransaction(_)
    ));

    tx.hard_reset();
    assert_eq!(tx.attempt(), 1);
    assert_eq!(tx.status(), TransactionStatus::Active);
}

#[test]
fn soft_reset_of_live_transaction_aborts_it() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    let events = Arc::new(Mutex::new(Vec::new()));

    let mut tx = stm.new_transaction();
    let sink = Arc::clone(&events);
    tx.register_lifecycle_listener(Arc::new(move |_: TxnId, event: TransactionLifecycleEvent| {
        sink.lock().push(event);
    }))
    .unwrap();
    tx.open_for_write(&r, LockMode::Commit).unwrap().value = 9;

    assert!(tx.soft_reset());
    assert_eq!(*events.lock(), vec![TransactionLifecycleEvent::PostAbort]);
    assert_eq!(r.committed_value(), Some(0));
    assert_released(&r);

    // normal listeners do not survive the reset
    tx.abort().unwrap();
    assert_eq!(events.lock().len(), 1);
}

#[test]
fn reset_clears_abort_only() {
    let stm = stm();
    let mut tx = stm.new_transaction();
    tx.set_abort_only().unwrap();
    assert!(tx.soft_reset());
    assert!(!tx.is_abort_only());
    tx.commit().unwrap();
}

#[test]
fn atomically_retries_conflicts() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    let mut interfered = false;

    let attempts = atomically(stm.default_factory(), |tx| {
        tx.open_for_write(&r, LockMode::None)?.value += 1;
        if !interfered {
            interfered = true;
            commit_write(&stm, &r, 10);
        }
        Ok(tx.attempt())
    })
    .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(r.committed_value(), Some(11));
}

#[test]
fn pooled_transaction_is_fully_reinitialised() {
    TransactionPool::clear();
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut tx = stm.default_factory().new_pooled_transaction();
    tx.register_permanent_lifecycle_listener(Arc::new(|_: TxnId, _: TransactionLifecycleEvent| {}))
        .unwrap();
    tx.open_for_write(&r, LockMode::Update).unwrap().value = 1;
    tx.set_abort_only().unwrap();
    assert!(tx.soft_reset());
    let old_id = tx.id();
    TransactionPool::release(tx);
    assert_released(&r);

    let mut tx = stm.default_factory().new_pooled_transaction();
    assert_eq!(TransactionPool::pool_size(), 0);
    assert_ne!(tx.id(), old_id);
    assert_eq!(tx.attempt(), 1);
    assert!(!tx.is_abort_only());
    assert_eq!(tx.attached_count(), 0);
    assert_eq!(tx.status(), TransactionStatus::Active);

    tx.open_for_write(&r, LockMode::None).unwrap().value = 2;
    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(2));
    TransactionPool::release(tx);
    TransactionPool::clear();
}
