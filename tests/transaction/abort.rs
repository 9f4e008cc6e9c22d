//! Abort Tests

use crate::common::*;
use orecstm::{LockMode, StmError, TransactionStatus};

#[test]
fn abort_discards_writes_and_releases() {
    let stm = stm();
    let a = stm.new_ref(1u64);
    let b = stm.new_ref(2u64);
    let c = stm.new_ref(3u64);

    let mut tx = stm.new_transaction();
    tx.open_for_write(&a, LockMode::None).unwrap().value = 10;
    tx.open_for_write(&b, LockMode::Commit).unwrap().value = 20;
    tx.open_for_read(&c, LockMode::Update).unwrap();
    tx.commute(&a, |v| v + 1).unwrap();

    tx.abort().unwrap();
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert_eq!(tx.attached_count(), 0);
    assert_eq!(a.committed_value(), Some(1));
    assert_eq!(b.committed_value(), Some(2));
    for r in [&a, &b, &c] {
        assert_released(r);
    }
    assert_eq!(stm.global_conflict_count(), 0);
}

#[test]
fn abort_twice_is_a_noop() {
    let stm = stm();
    let mut tx = stm.new_transaction();
    tx.abort().unwrap();
    tx.abort().unwrap();
    assert_eq!(tx.status(), TransactionStatus::Aborted);
}

#[test]
fn commit_after_abort_is_dead() {
    let stm = stm();
    let mut tx = stm.new_transaction();
    tx.abort().unwrap();
    assert!(matches!(tx.commit().unwrap_err(), StmError::DeadTransaction(_)));
    assert!(matches!(tx.prepare().unwrap_err(), StmError::DeadTransaction(_)));
}

#[test]
fn abort_of_prepared_transaction_releases_commit_locks() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    let mut tx = stm.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 1;
    tx.prepare().unwrap();
    tx.abort().unwrap();
    assert_eq!(r.committed_value(), Some(0));
    assert_released(&r);
}

#[test]
fn aborted_reads_do_not_count_towards_bias() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    for _ in 0..3 {
        let mut tx = stm.new_transaction();
        tx.open_for_read(&r, LockMode::None).unwrap();
        tx.abort().unwrap();
    }
    assert_eq!(r.orec().readonly_count(), 0);
    assert_released(&r);
}

#[test]
fn dropped_transaction_rolls_back() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    {
        let mut tx = stm.new_transaction();
        tx.open_for_write(&r, LockMode::Commit).unwrap().value = 5;
        tx.prepare().unwrap();
    }
    assert_eq!(r.committed_value(), Some(0));
    assert_released(&r);
}
