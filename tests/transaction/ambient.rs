//! Ambient Context Tests
//!
//! The current transaction is reachable from nested code on the same thread
//! and invisible to other threads.

use crate::common::*;
use std::thread;

fn nested_save(depth: usize) -> Result<()> {
    if depth == 0 {
        return put_current("deep", "value");
    }
    nested_save(depth - 1)
}

#[test]
fn fresh_thread_has_no_current_transaction() {
    assert!(!Transaction::has_current());
    assert!(matches!(Transaction::current(), Err(Error::NotInTransaction)));
    assert!(tessera::context::current_id().is_none());
}

#[test]
fn current_follows_transaction_scope() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    assert!(Transaction::has_current());
    assert_eq!(Transaction::current().unwrap(), txn);
    assert_eq!(tessera::context::current_id(), Some(txn.id()));

    drop(txn);
    assert!(!Transaction::has_current());
    assert!(matches!(Transaction::current(), Err(Error::NotInTransaction)));
}

#[test]
fn current_is_cleared_after_commit_only_on_drop() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    txn.commit().unwrap();
    assert!(Transaction::has_current());
    assert!(Transaction::current().unwrap().is_finalized());

    drop(txn);
    assert!(!Transaction::has_current());
}

#[test]
fn nested_code_reaches_current_transaction() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    nested_save(8).unwrap();
    txn.commit().unwrap();

    assert_eq!(t.memory.get("deep"), Some(b"value".to_vec()));
}

#[test]
fn work_outside_a_transaction_fails() {
    let err = put_current("k", "v").unwrap_err();
    assert!(matches!(err, Error::NotInTransaction));
}

#[test]
fn stale_handle_reports_not_in_transaction() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    let handle = txn.handle();
    assert!(handle.is_live());
    drop(txn);

    assert!(!handle.is_live());
    assert!(matches!(handle.rollback(), Err(Error::NotInTransaction)));
    assert!(matches!(put_current("k", "v"), Err(Error::NotInTransaction)));
}

#[test]
fn threads_have_independent_slots() {
    let t = TestDb::new();
    let txn = t.db.begin().unwrap();

    let memory = t.memory.clone();
    let worker = thread::spawn(move || {
        assert!(!Transaction::has_current());

        let db = Tessera::builder().database(memory).open();
        let own = db.begin().unwrap();
        put_current("from-worker", "1").unwrap();
        own.commit().unwrap();
        own.id()
    });
    let worker_id = worker.join().unwrap();

    assert_ne!(worker_id, txn.id());
    assert_eq!(Transaction::current().unwrap(), txn);
    assert_eq!(t.memory.get("from-worker"), Some(b"1".to_vec()));
    txn.rollback().unwrap();
}

#[test]
fn wrong_backend_type_is_reported() {
    struct Other;

    impl TransactionImpl for Other {
        fn commit(&mut self) -> std::result::Result<(), DatabaseError> {
            Ok(())
        }

        fn rollback(&mut self) -> std::result::Result<(), DatabaseError> {
            Ok(())
        }
    }

    let _txn = Transaction::new(Box::new(Other));
    assert!(matches!(
        put_current("k", "v"),
        Err(Error::BackendMismatch { .. })
    ));
}
