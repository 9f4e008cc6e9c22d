//! Lifecycle Listener Tests

use crate::common::*;
use orecstm::{
    LockMode, TransactionLifecycleEvent as Event, TransactionLifecycleListener, TransactionStatus,
    TxnId,
};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(&'static str, Event)>>,
}

struct Tagged {
    tag: &'static str,
    recorder: Arc<Recorder>,
}

impl TransactionLifecycleListener for Tagged {
    fn notify(&self, _txn: TxnId, event: Event) {
        self.recorder.events.lock().push((self.tag, event));
    }
}

fn tagged(tag: &'static str, recorder: &Arc<Recorder>) -> Arc<Tagged> {
    Arc::new(Tagged {
        tag,
        recorder: Arc::clone(recorder),
    })
}

#[test]
fn commit_fires_all_phases_permanent_first() {
    let stm = stm();
    let recorder = Arc::new(Recorder::default());

    let mut tx = stm.new_transaction();
    tx.register_lifecycle_listener(tagged("normal", &recorder)).unwrap();
    tx.register_permanent_lifecycle_listener(tagged("permanent", &recorder))
        .unwrap();
    tx.commit().unwrap();

    let expected: Vec<_> = [Event::PrePrepare, Event::PostPrepare, Event::PreCommit, Event::PostCommit]
        .into_iter()
        .flat_map(|e| [("permanent", e), ("normal", e)])
        .collect();
    assert_eq!(*recorder.events.lock(), expected);
}

#[test]
fn listeners_fire_in_registration_order() {
    let stm = stm();
    let recorder = Arc::new(Recorder::default());

    let mut tx = stm.new_transaction();
    tx.register_lifecycle_listener(tagged("first", &recorder)).unwrap();
    tx.register_lifecycle_listener(tagged("second", &recorder)).unwrap();
    tx.abort().unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec![("first", Event::PostAbort), ("second", Event::PostAbort)]
    );
}

#[test]
fn failed_prepare_fires_post_abort() {
    let stm = stm();
    let recorder = Arc::new(Recorder::default());
    let r = stm.new_ref(0u64);

    let mut tx = stm.new_transaction();
    tx.register_lifecycle_listener(tagged("tx", &recorder)).unwrap();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 1;
    commit_write(&stm, &r, 2);
    assert_conflict(tx.commit().unwrap_err());

    assert_eq!(
        *recorder.events.lock(),
        vec![("tx", Event::PrePrepare), ("tx", Event::PostAbort)]
    );
}

#[test]
fn closures_are_listeners() {
    let stm = stm();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut tx = stm.new_transaction();
    let id = tx.id();
    let sink = Arc::clone(&seen);
    tx.register_lifecycle_listener(Arc::new(move |txn: TxnId, event: Event| {
        sink.lock().push((txn, event));
    }))
    .unwrap();
    tx.abort().unwrap();

    assert_eq!(*seen.lock(), vec![(id, Event::PostAbort)]);
}

#[test]
fn registration_on_dead_transaction_fails() {
    let stm = stm();
    let recorder = Arc::new(Recorder::default());
    let mut tx = stm.new_transaction();
    tx.abort().unwrap();
    assert!(tx
        .register_lifecycle_listener(tagged("late", &recorder))
        .unwrap_err()
        .is_dead());
}

#[test]
fn panicking_listener_aborts_before_commit() {
    struct Bomb;
    impl TransactionLifecycleListener for Bomb {
        fn notify(&self, _txn: TxnId, event: Event) {
            if event == Event::PreCommit {
                panic!("listener failed");
            }
        }
    }

    let stm = stm();
    let r = stm.new_ref(0u64);
    let mut tx = stm.new_transaction();
    tx.register_lifecycle_listener(Arc::new(Bomb)).unwrap();
    tx.open_for_write(&r, LockMode::None).unwrap().value = 1;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tx.commit()));
    assert!(outcome.is_err());
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert_eq!(r.committed_value(), Some(0));
    assert_released(&r);
}
