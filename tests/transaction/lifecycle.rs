//! Transaction Lifecycle Tests
//!
//! Commit, rollback, and implicit rollback on drop.

use crate::common::*;

// ============================================================================
// Explicit Finalization
// ============================================================================

#[test]
fn commit_makes_writes_visible() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    put_current("user:1", "alice").unwrap();
    assert!(t.memory.is_empty());

    txn.commit().unwrap();
    assert_eq!(t.memory.get("user:1"), Some(b"alice".to_vec()));
    assert_eq!(stages(&t.last_journal()), vec![(Stage::Begin, true), (Stage::Commit, true)]);
}

#[test]
fn rollback_discards_writes() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    put_current("user:1", "alice").unwrap();
    txn.rollback().unwrap();

    assert!(t.memory.is_empty());
    assert_eq!(stages(&t.last_journal()), vec![(Stage::Begin, true), (Stage::Rollback, true)]);
}

#[test]
fn second_finalization_is_rejected() {
    let t = TestDb::new();

    let txn = t.db.begin().unwrap();
    txn.commit().unwrap();
    assert!(matches!(txn.commit(), Err(Error::AlreadyFinalized)));
    assert!(matches!(txn.rollback(), Err(Error::AlreadyFinalized)));
    drop(txn);

    let txn = t.db.begin().unwrap();
    txn.rollback().unwrap();
    assert!(matches!(txn.rollback(), Err(Error::AlreadyFinalized)));
    assert!(matches!(txn.commit(), Err(Error::AlreadyFinalized)));
    drop(txn);

    for txn in [1, 2] {
        assert_eq!(finalizations(&t.memory.journal_for(txn)), 1);
    }
}

// ============================================================================
// Backend Failures
// ============================================================================

#[test]
fn failed_commit_can_be_rolled_back() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Commit).build());

    let txn = t.db.begin().unwrap();
    put_current("k", "v").unwrap();

    let err = txn.commit().unwrap_err();
    assert!(err.is_database());
    assert!(!txn.is_finalized());

    txn.rollback().unwrap();
    assert!(txn.is_finalized());
    drop(txn);

    assert!(t.memory.is_empty());
    assert_eq!(
        stages(&t.last_journal()),
        vec![(Stage::Begin, true), (Stage::Commit, false), (Stage::Rollback, true)]
    );
}

#[test]
fn failed_commit_is_rolled_back_on_drop() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Commit).build());

    {
        let txn = t.db.begin().unwrap();
        assert!(txn.commit().is_err());
    }

    assert_eq!(
        stages(&t.last_journal()),
        vec![(Stage::Begin, true), (Stage::Commit, false), (Stage::Rollback, true)]
    );
}

#[test]
fn failed_rollback_is_final() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Rollback).build());

    let txn = t.db.begin().unwrap();
    let err = txn.rollback().unwrap_err();
    assert_eq!(err.as_database().map(|e| e.kind()), Some(DatabaseErrorKind::Connection));
    assert!(txn.is_finalized());
    assert!(matches!(txn.rollback(), Err(Error::AlreadyFinalized)));
    drop(txn);

    assert_eq!(stages(&t.last_journal()), vec![(Stage::Begin, true), (Stage::Rollback, false)]);
}

#[test]
fn begin_failure_leaves_no_current_transaction() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Begin).build());

    let err = t.db.begin().unwrap_err();
    assert!(err.is_database());
    assert!(!Transaction::has_current());
}

// ============================================================================
// Implicit Rollback
// ============================================================================

#[test]
fn drop_without_finalize_rolls_back() {
    let t = TestDb::new();

    {
        let _txn = t.db.begin().unwrap();
        put_current("k", "v").unwrap();
    }

    assert!(t.memory.is_empty());
    assert_eq!(stages(&t.last_journal()), vec![(Stage::Begin, true), (Stage::Rollback, true)]);
}

#[test]
fn drop_swallows_rollback_failure() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Rollback).build());

    let outcome = (|| -> Result<()> {
        let _txn = t.db.begin()?;
        put_current("k", "v")?;
        Ok(())
    })();

    assert!(outcome.is_ok());
    assert!(!Transaction::has_current());
    assert_eq!(stages(&t.last_journal()), vec![(Stage::Begin, true), (Stage::Rollback, false)]);
}

#[test]
fn drop_during_unwind_does_not_abort() {
    let t = TestDb::from_memory(MemoryDatabase::builder().fail_on(Stage::Rollback).build());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _txn = t.db.begin().unwrap();
        panic!("business logic failed");
    }));

    assert!(result.is_err());
    assert!(!Transaction::has_current());
    assert_eq!(finalizations(&t.last_journal()), 1);
}
