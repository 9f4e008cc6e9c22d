//! Pessimistic Lock Level Tests

use crate::common::*;
use orecstm::{LockMode, PessimisticLockLevel, StmError, TransactionConfig};

#[test]
fn update_writes_locks_on_open() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::UpdateWrites);
    let r = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 1;
    assert_eq!(r.orec().lock_mode(), LockMode::Update);

    // readers are not blocked by an update lock, other writers are
    assert_eq!(commit_read(&stm, &r), 0);
    let mut other = stm.new_transaction();
    other.open_for_write(&r, LockMode::None).unwrap().value = 2;
    assert_conflict(other.commit().unwrap_err());

    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(1));
    assert_released(&r);
}

#[test]
fn update_writes_leaves_reads_unlocked() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::UpdateWrites);
    let r = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_read(&r, LockMode::None).unwrap();
    assert_eq!(r.orec().lock_mode(), LockMode::None);
    tx.commit().unwrap();
}

#[test]
fn commit_writes_blocks_readers() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::CommitWrites);
    let r = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_write(&r, LockMode::None).unwrap();
    assert_eq!(r.orec().lock_mode(), LockMode::Commit);

    let mut reader = stm.new_transaction();
    assert_conflict(reader.open_for_read(&r, LockMode::None).unwrap_err());
    tx.abort().unwrap();
    assert_released(&r);
}

#[test]
fn commit_reads_locks_every_open() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::CommitReads);
    let r = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_read(&r, LockMode::None).unwrap();
    assert_eq!(r.orec().lock_mode(), LockMode::Commit);
    assert_eq!(r.orec().lock_owner(), Some(tx.id()));
    tx.commit().unwrap();
    assert_released(&r);
}

#[test]
fn read_locking_skips_conflict_counter() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::UpdateReads);
    let a = stm.new_ref(0u64);
    let b = stm.new_ref(0u64);
    let unrelated = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_read(&a, LockMode::None).unwrap();
    let snapshot = tx.local_conflict_counter();

    commit_write(&stm, &unrelated, 1);

    tx.open_for_read(&b, LockMode::None).unwrap();
    assert_eq!(tx.local_conflict_counter(), snapshot);
    tx.commit().unwrap();
    assert_released(&a);
    assert_released(&b);
}

#[test]
fn pessimistic_reader_is_never_stale() {
    let stm = stm();
    let factory = pessimistic(&stm, PessimisticLockLevel::UpdateReads);
    let r = stm.new_ref(0u64);

    let mut tx = factory.new_transaction();
    tx.open_for_read(&r, LockMode::None).unwrap();

    let mut writer = stm.new_transaction();
    writer.open_for_write(&r, LockMode::None).unwrap().value = 1;
    assert_conflict(writer.commit().unwrap_err());

    tx.commit().unwrap();
    assert_eq!(r.committed_value(), Some(0));
}

#[test]
fn readonly_with_write_locking_is_rejected() {
    let stm = stm();
    let config = TransactionConfig::new()
        .with_readonly(true)
        .with_pessimistic_lock_level(PessimisticLockLevel::UpdateWrites);
    assert!(matches!(
        stm.transaction_factory(config).unwrap_err(),
        StmError::IllegalArgument(_)
    ));
}
