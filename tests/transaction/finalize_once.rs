//! Finalize-Once Property Tests
//!
//! Whatever sequence of commit and rollback calls a caller makes, and
//! whichever backend calls fail, exactly one finalizing action takes effect
//! by the time the transaction is dropped.

use crate::common::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Commit { fail_flush: bool, fail_commit: bool },
    Rollback { fail: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), any::<bool>())
            .prop_map(|(fail_flush, fail_commit)| Op::Commit { fail_flush, fail_commit }),
        any::<bool>().prop_map(|fail| Op::Rollback { fail }),
    ]
}

fn arm(memory: &MemoryDatabase, stage: Stage, fail: bool) {
    if fail {
        memory.fail_on(stage);
    } else {
        memory.recover(stage);
    }
}

proptest! {
    #[test]
    fn exactly_one_finalization(
        ops in prop::collection::vec(op(), 0..8),
        session in any::<bool>(),
        fail_drop_rollback in any::<bool>(),
    ) {
        let memory = MemoryDatabase::builder().session_per_transaction(session).build();
        let t = TestDb::from_memory(memory.clone());

        let txn = t.db.begin().unwrap();
        let mut finalized = false;

        for op in ops {
            let result = match op {
                Op::Commit { fail_flush, fail_commit } => {
                    arm(&memory, Stage::Flush, fail_flush);
                    arm(&memory, Stage::Commit, fail_commit);
                    txn.commit()
                }
                Op::Rollback { fail } => {
                    arm(&memory, Stage::Rollback, fail);
                    txn.rollback()
                }
            };

            if finalized {
                prop_assert!(matches!(result, Err(Error::AlreadyFinalized)));
            }
            finalized = txn.is_finalized();
        }

        arm(&memory, Stage::Rollback, fail_drop_rollback);
        drop(txn);

        prop_assert!(!Transaction::has_current());
        prop_assert_eq!(finalizations(&memory.journal()), 1);
    }
}
