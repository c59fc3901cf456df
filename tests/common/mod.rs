//! Shared helpers for integration tests.

#![allow(dead_code)]

pub use tessera::prelude::*;
pub use tessera::{JournalEvent, MemoryDatabase, Stage};

/// Route tracing output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// In-memory backend plus a facade sharing it.
pub struct TestDb {
    pub memory: MemoryDatabase,
    pub db: Tessera,
}

impl TestDb {
    pub fn new() -> Self {
        Self::from_memory(MemoryDatabase::new())
    }

    pub fn with_session() -> Self {
        Self::from_memory(MemoryDatabase::builder().session_per_transaction(true).build())
    }

    pub fn from_memory(memory: MemoryDatabase) -> Self {
        init_tracing();
        let db = Tessera::builder().database(memory.clone()).open();
        TestDb { memory, db }
    }

    /// Journal of the most recently begun backend transaction.
    pub fn last_journal(&self) -> Vec<JournalEvent> {
        let last = self.memory.journal().last().map(|e| e.txn);
        match last {
            Some(txn) => self.memory.journal_for(txn),
            None => Vec::new(),
        }
    }
}

/// Stages and outcomes, in order.
pub fn stages(events: &[JournalEvent]) -> Vec<(Stage, bool)> {
    events.iter().map(|e| (e.stage, e.ok)).collect()
}

/// Finalizing calls that took effect on the backend: successful commits
/// plus every rollback attempt.
pub fn finalizations(events: &[JournalEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!((e.stage, e.ok), (Stage::Commit, true) | (Stage::Rollback, _)))
        .count()
}

/// Stage a write through the current transaction.
pub fn put_current(key: &str, value: &str) -> Result<()> {
    Transaction::current()?.with_impl(|t: &mut MemoryTransaction| t.put(key, value))
}

/// Register an object with the current transaction's session.
pub fn persist_current(key: &str, value: &str) -> Result<()> {
    Transaction::current()?
        .with_impl(|t: &mut MemoryTransaction| t.session().map(|s| s.persist(key, value)))?
        .ok_or(Error::SessionMissing)
}
