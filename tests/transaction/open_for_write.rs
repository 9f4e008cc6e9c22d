//! Open For Write Tests

use crate::common::*;
use orecstm::{DirtyState, EntryKind, LockMode, StmError, TransactionConfig, TransactionStatus};
use std::sync::Arc;

#[test]
fn increment_commits_and_releases() {
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut tx = stm.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap().value += 1;
    tx.commit().unwrap();

    assert_eq!(r.committed_value(), Some(1));
    assert_released(&r);
    assert_eq!(r.orec().surplus(), 0);
}

#[test]
fn write_is_idempotent() {
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut tx = stm.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 10;
    let second = tx.open_for_write(&r, LockMode::None).unwrap();
    assert_eq!(second.value, 10);
    second.value += 1;
    assert_eq!(tx.attached_count(), 1);
    assert_eq!(tx.attached_kind(&r), Some(EntryKind::Write));
    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(11));
}

#[test]
fn private_copy_keeps_its_base() {
    let stm = stm();
    let r = stm.new_ref(7u64);
    let committed = r.load_committed().unwrap();

    let mut tx = stm.new_transaction();
    let tranlocal = tx.open_for_write(&r, LockMode::None).unwrap();
    assert!(!tranlocal.is_committed());
    assert_eq!(tranlocal.dirty(), DirtyState::Unknown);
    assert!(Arc::ptr_eq(tranlocal.read().unwrap(), &committed));
    tx.abort().unwrap();
}

#[test]
fn unchanged_write_is_not_published() {
    let stm = stm();
    let r = stm.new_ref(5u64);
    let committed = r.load_committed().unwrap();
    let writes_before = stm.global_conflict_count();

    let mut tx = stm.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 5;
    tx.commit().unwrap();

    assert!(Arc::ptr_eq(&r.load_committed().unwrap(), &committed));
    assert_eq!(stm.global_conflict_count(), writes_before);
    assert_eq!(r.orec().readonly_count(), 1);
    assert_released(&r);
}

#[test]
fn disabled_dirty_check_publishes_every_write() {
    let stm = stm();
    let factory = factory(&stm, TransactionConfig::new().with_dirty_check(false));
    let r = stm.new_ref(5u64);
    let committed = r.load_committed().unwrap();

    let mut tx = factory.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap();
    tx.commit().unwrap();

    assert!(!Arc::ptr_eq(&r.load_committed().unwrap(), &committed));
    assert_eq!(r.committed_value(), Some(5));
    assert_eq!(stm.global_conflict_count(), 1);
    assert_eq!(r.orec().readonly_count(), 0);
}

#[test]
fn read_then_write_forks_private_copy() {
    let stm = stm();
    let r = stm.new_ref(1u64);

    let mut tx = stm.new_transaction();
    tx.open_for_read(&r, LockMode::None).unwrap();
    assert_eq!(tx.attached_kind(&r), Some(EntryKind::Read));
    tx.open_for_write(&r, LockMode::None).unwrap().value = 2;
    assert_eq!(tx.attached_kind(&r), Some(EntryKind::Write));
    assert_eq!(r.orec().surplus(), 1);
    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(2));
    assert_released(&r);
}

#[test]
fn concurrent_writer_loses_at_prepare() {
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut first = stm.new_transaction();
    let mut second = stm.new_transaction();
    first.open_for_write(&r, LockMode::None).unwrap().value = 1;
    second.open_for_write(&r, LockMode::None).unwrap().value = 2;

    first.commit().unwrap();
    assert_conflict(second.commit().unwrap_err());
    assert_eq!(second.status(), TransactionStatus::Aborted);
    assert_eq!(r.committed_value(), Some(1));
    assert_released(&r);
}

#[test]
fn commit_lock_on_open_blocks_other_writers() {
    let stm = stm();
    let r = stm.new_ref(0u64);

    let mut owner = stm.new_transaction();
    owner.open_for_write(&r, LockMode::Commit).unwrap().value = 1;

    let mut other = stm.new_transaction();
    assert_conflict(other.open_for_write(&r, LockMode::None).unwrap_err());

    owner.commit().unwrap();
    assert_eq!(r.committed_value(), Some(1));
    assert_released(&r);
}

#[test]
fn readonly_write_aborts() {
    let stm = stm();
    let r = stm.new_ref(0u64);
    let factory = readonly(&stm);

    let mut tx = factory.new_transaction();
    tx.open_for_read(&r, LockMode::None).unwrap();
    let err = tx.open_for_write(&r, LockMode::None).unwrap_err();
    assert!(matches!(err, StmError::Readonly(_)));
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert_released(&r);
}

#[test]
fn write_on_prepared_transaction_aborts_it() {
    let stm = stm();
    let a = stm.new_ref(0u64);
    let b = stm.new_ref(0u64);

    let mut tx = stm.new_transaction();
    tx.open_for_write(&a, LockMode::None).unwrap().value = 1;
    tx.prepare().unwrap();
    assert_eq!(a.orec().lock_mode(), LockMode::Commit);

    let err = tx.open_for_write(&b, LockMode::None).unwrap_err();
    assert!(matches!(err, StmError::PreparedTransaction(_)));
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert_eq!(a.committed_value(), Some(0));
    assert_released(&a);
    assert_released(&b);
}

#[test]
fn multi_ref_commit_is_atomic() {
    let stm = stm();
    let a = stm.new_ref(100i64);
    let b = stm.new_ref(0i64);

    let mut transfer = stm.new_transaction();
    transfer.open_for_write(&a, LockMode::None).unwrap().value -= 40;
    transfer.open_for_write(&b, LockMode::None).unwrap().value += 40;
    transfer.prepare().unwrap();

    // both refs are commit-locked until write-back
    let mut reader = stm.new_transaction();
    assert_conflict(reader.open_for_read(&b, LockMode::None).unwrap_err());

    transfer.commit().unwrap();
    assert_eq!(commit_read(&stm, &a) + commit_read(&stm, &b), 100);
    assert_eq!(b.committed_value(), Some(40));
    assert_eq!(stm.global_conflict_count(), 2);
}
