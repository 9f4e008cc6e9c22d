//! Property Tests
//!
//! Random single-threaded histories of committed and aborted transactions,
//! checked against a plain model of the refs' values.

use crate::common::*;
use orecstm::LockMode;
use proptest::prelude::*;

const REFS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Read(usize),
    Write(usize, u8),
    Commute(usize, u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..REFS).prop_map(Op::Read),
        (0..REFS, 0u8..4).prop_map(|(i, v)| Op::Write(i, v)),
        (0..REFS, 0u8..3).prop_map(|(i, d)| Op::Commute(i, d)),
    ]
}

fn history() -> impl Strategy<Value = Vec<(Vec<Op>, bool)>> {
    prop::collection::vec((prop::collection::vec(op(), 0..6), any::<bool>()), 1..40)
}

proptest! {
    #[test]
    fn histories_match_model_and_release_everything(steps in history()) {
        let stm = stm();
        let refs: Vec<_> = (0..REFS).map(|_| stm.new_ref(0u64)).collect();
        let mut model = vec![0u64; REFS];

        for (ops, commit) in steps {
            let mut local = model.clone();
            let mut tx = stm.new_transaction();
            for op in &ops {
                match *op {
                    Op::Read(i) => {
                        let seen = tx.open_for_read(&refs[i], LockMode::None).unwrap().value;
                        prop_assert_eq!(seen, local[i]);
                    }
                    Op::Write(i, v) => {
                        tx.open_for_write(&refs[i], LockMode::None).unwrap().value = u64::from(v);
                        local[i] = u64::from(v);
                    }
                    Op::Commute(i, d) => {
                        let d = u64::from(d);
                        tx.commute(&refs[i], move |v| v + d).unwrap();
                        local[i] += d;
                    }
                }
            }

            let writes_before = stm.global_conflict_count();
            if commit {
                tx.commit().unwrap();
                let changed = (0..REFS).filter(|&i| local[i] != model[i]).count() as u64;
                // dirty check: only refs whose value changed are published
                prop_assert_eq!(stm.global_conflict_count() - writes_before, changed);
                model = local;
            } else {
                tx.abort().unwrap();
                prop_assert_eq!(stm.global_conflict_count(), writes_before);
            }

            for (r, expected) in refs.iter().zip(&model) {
                prop_assert_eq!(r.committed_value(), Some(*expected));
                assert_released(r);
            }
        }
    }

    #[test]
    fn unchanged_writes_never_publish(values in prop::collection::vec(0u64..4, 1..20)) {
        let stm = stm();
        let r = stm.new_ref(values[0]);
        let mut current = values[0];

        for v in values {
            let before = r.load_committed().unwrap();
            commit_write(&stm, &r, v);
            let after = r.load_committed().unwrap();
            prop_assert_eq!(std::sync::Arc::ptr_eq(&before, &after), v == current);
            current = v;
        }
    }
}
