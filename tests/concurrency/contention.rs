//! Contention Tests
//!
//! Tests for thread safety:
//! - Concurrent increments of one ref
//! - Concurrent commutes
//! - Readers racing writers on a hot ref

use crate::common::*;
use orecstm::{LockMode, PessimisticLockLevel, Stm, TransactionConfig};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 200;

fn contended_stm() -> Stm {
    Stm::builder().max_retries(100_000).build().unwrap()
}

#[test]
fn concurrent_increments_are_not_lost() {
    let stm = contended_stm();
    let counter = stm.new_ref(0u64);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let stm = stm.clone();
            let counter = counter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    atomically(stm.default_factory(), |tx| {
                        tx.open_for_write(&counter, LockMode::None)?.value += 1;
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.committed_value(), Some((THREADS * OPS_PER_THREAD) as u64));
    assert_released(&counter);
}

#[test]
fn concurrent_commutes_are_not_lost() {
    let stm = contended_stm();
    let counter = stm.new_ref(0u64);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let stm = stm.clone();
            let counter = counter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    atomically(stm.default_factory(), |tx| tx.commute(&counter, |v| v + 1)).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.committed_value(), Some((THREADS * OPS_PER_THREAD) as u64));
    assert_released(&counter);
}

#[test]
fn pessimistic_increments_are_not_lost() {
    let stm = contended_stm();
    let factory = factory(
        &stm,
        TransactionConfig::new()
            .with_max_retries(100_000)
            .with_pessimistic_lock_level(PessimisticLockLevel::CommitWrites),
    );
    let counter = stm.new_ref(0u64);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let factory = factory.clone();
            let counter = counter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    atomically(&factory, |tx| {
                        tx.open_for_write(&counter, LockMode::None)?.value += 1;
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.committed_value(), Some((THREADS * OPS_PER_THREAD) as u64));
    assert_released(&counter);
}

#[test]
fn readers_see_monotonic_values_on_hot_ref() {
    let stm = contended_stm();
    let r = stm.new_ref(0u64);
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let writer = {
        let stm = stm.clone();
        let r = r.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..OPS_PER_THREAD {
                atomically(stm.default_factory(), |tx| {
                    tx.open_for_write(&r, LockMode::None)?.value += 1;
                    Ok(())
                })
                .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..THREADS)
        .map(|_| {
            let stm = stm.clone();
            let r = r.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut last = 0;
                for _ in 0..OPS_PER_THREAD {
                    let seen = atomically(stm.default_factory(), |tx| {
                        Ok(tx.open_for_read(&r, LockMode::None)?.value)
                    })
                    .unwrap();
                    assert!(seen >= last, "went back from {last} to {seen}");
                    last = seen;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for h in readers {
        h.join().unwrap();
    }

    assert_eq!(r.committed_value(), Some(OPS_PER_THREAD as u64));
    assert_released(&r);
}
