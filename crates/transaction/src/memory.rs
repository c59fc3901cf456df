//! Ephemeral in-memory backend
//!
//! [`MemoryDatabase`] is a key/value store that implements the backend
//! contracts without any I/O:
//! - [`MemoryTransaction`] stages puts and deletes and applies them
//!   atomically on commit.
//! - [`MemorySession`] tracks pending objects and flushes them into the
//!   transaction's staging area.
//!
//! Every begin, flush, commit and rollback is appended to a journal, and any
//! stage can be armed to fail. Both exist so callers can observe exactly what
//! the transaction envelope did to the backend.

use crate::backend::{Database, Session, SessionSlot, TransactionImpl};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::DatabaseError;
use tracing::debug;

/// Backend operation that can be journaled or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `Database::begin`
    Begin,
    /// `Session::flush`
    Flush,
    /// `TransactionImpl::commit`
    Commit,
    /// `TransactionImpl::rollback`
    Rollback,
}

/// One backend call, tagged with the backend transaction number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEvent {
    /// Backend transaction number (not the envelope's `TxnId`)
    pub txn: u64,
    /// Operation performed
    pub stage: Stage,
    /// Whether it succeeded
    pub ok: bool,
}

enum Write {
    Put(String, Vec<u8>),
    Delete(String),
}

type Staging = Arc<Mutex<Vec<Write>>>;

/// Journal entries kept by default before the oldest are dropped.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 16_384;

struct MemoryInner {
    store: Mutex<BTreeMap<String, Vec<u8>>>,
    journal: Mutex<VecDeque<JournalEvent>>,
    journal_capacity: usize,
    failing: Mutex<HashSet<Stage>>,
    next_txn: AtomicU64,
    session_per_transaction: bool,
}

impl MemoryInner {
    fn record(&self, txn: u64, stage: Stage, ok: bool) {
        let mut journal = self.journal.lock();
        if journal.len() == self.journal_capacity {
            journal.pop_front();
        }
        journal.push_back(JournalEvent { txn, stage, ok });
    }

    /// Journal the call and fail it if the stage is armed.
    fn enter(&self, txn: u64, stage: Stage) -> Result<(), DatabaseError> {
        let fail = self.failing.lock().contains(&stage);
        self.record(txn, stage, !fail);
        if fail {
            return Err(DatabaseError::connection(format!(
                "injected {:?} failure",
                stage
            )));
        }
        Ok(())
    }
}

/// In-memory database.
///
/// Cheap to clone; clones share the same store and journal.
///
/// The journal is bounded: once it holds its capacity
/// ([`DEFAULT_JOURNAL_CAPACITY`] unless configured through
/// [`MemoryDatabaseBuilder::journal_capacity`]) each new entry evicts the
/// oldest. Long-lived handles can also call
/// [`clear_journal`](MemoryDatabase::clear_journal).
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<MemoryInner>,
}

impl MemoryDatabase {
    /// A database with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for database configuration.
    pub fn builder() -> MemoryDatabaseBuilder {
        MemoryDatabaseBuilder::new()
    }

    /// Whether new transactions get their own session.
    pub fn session_per_transaction(&self) -> bool {
        self.inner.session_per_transaction
    }

    /// Committed value of `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.store.lock().get(key).cloned()
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    /// Make every future call of `stage` fail until [`recover`] is called.
    ///
    /// [`recover`]: MemoryDatabase::recover
    pub fn fail_on(&self, stage: Stage) {
        self.inner.failing.lock().insert(stage);
    }

    /// Stop failing `stage`.
    pub fn recover(&self, stage: Stage) {
        self.inner.failing.lock().remove(&stage);
    }

    /// Snapshot of the journal, oldest first.
    pub fn journal(&self) -> Vec<JournalEvent> {
        self.inner.journal.lock().iter().copied().collect()
    }

    /// Journal entries of one backend transaction.
    pub fn journal_for(&self, txn: u64) -> Vec<JournalEvent> {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|e| e.txn == txn)
            .copied()
            .collect()
    }

    /// Empty the journal.
    pub fn clear_journal(&self) {
        self.inner.journal.lock().clear();
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("keys", &self.len())
            .field("session_per_transaction", &self.inner.session_per_transaction)
            .finish()
    }
}

impl Database for MemoryDatabase {
    fn begin(&self) -> Result<Box<dyn TransactionImpl>, DatabaseError> {
        Ok(Box::new(self.begin_memory()?))
    }
}

impl MemoryDatabase {
    /// Begin a backend transaction without boxing it.
    pub fn begin_memory(&self) -> Result<MemoryTransaction, DatabaseError> {
        let txn = self.inner.next_txn.fetch_add(1, Ordering::Relaxed);
        self.inner.enter(txn, Stage::Begin)?;

        let staged: Staging = Arc::new(Mutex::new(Vec::new()));
        let session = if self.inner.session_per_transaction {
            SessionSlot::with(MemorySession {
                txn,
                db: self.inner.clone(),
                pending: BTreeMap::new(),
                staged: staged.clone(),
            })
        } else {
            SessionSlot::empty()
        };

        Ok(MemoryTransaction {
            txn,
            db: self.inner.clone(),
            staged,
            session,
        })
    }
}

/// Builder for [`MemoryDatabase`].
///
/// # Example
///
/// ```ignore
/// let db = MemoryDatabase::builder()
///     .session_per_transaction(true)
///     .fail_on(Stage::Commit)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDatabaseBuilder {
    session_per_transaction: bool,
    failing: HashSet<Stage>,
    journal_capacity: usize,
}

impl MemoryDatabaseBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            session_per_transaction: false,
            failing: HashSet::new(),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Give every transaction its own session (off by default).
    pub fn session_per_transaction(mut self, enabled: bool) -> Self {
        self.session_per_transaction = enabled;
        self
    }

    /// Start with `stage` armed to fail.
    pub fn fail_on(mut self, stage: Stage) -> Self {
        self.failing.insert(stage);
        self
    }

    /// Keep at most `capacity` journal entries (at least one).
    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity.max(1);
        self
    }

    /// Build the database.
    pub fn build(self) -> MemoryDatabase {
        MemoryDatabase {
            inner: Arc::new(MemoryInner {
                store: Mutex::new(BTreeMap::new()),
                journal: Mutex::new(VecDeque::new()),
                journal_capacity: self.journal_capacity,
                failing: Mutex::new(self.failing),
                next_txn: AtomicU64::new(1),
                session_per_transaction: self.session_per_transaction,
            }),
        }
    }
}

impl Default for MemoryDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend transaction of a [`MemoryDatabase`].
pub struct MemoryTransaction {
    txn: u64,
    db: Arc<MemoryInner>,
    staged: Staging,
    session: SessionSlot<MemorySession>,
}

impl MemoryTransaction {
    /// Backend transaction number, as used in the journal.
    pub fn number(&self) -> u64 {
        self.txn
    }

    /// Stage a write of `key`.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.staged
            .lock()
            .push(Write::Put(key.into(), value.into()));
    }

    /// Stage a delete of `key`.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.staged.lock().push(Write::Delete(key.into()));
    }

    /// Value of `key` as seen by this transaction.
    ///
    /// Session objects shadow staged writes, which shadow committed data.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(pending) = self.session.get().and_then(|s| s.pending.get(key)) {
            return pending.clone();
        }
        let staged = self.staged.lock().iter().rev().find_map(|w| match w {
            Write::Put(k, v) if k == key => Some(Some(v.clone())),
            Write::Delete(k) if k == key => Some(None),
            _ => None,
        });
        match staged {
            Some(v) => v,
            None => self.db.store.lock().get(key).cloned(),
        }
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// The embedded session, if this transaction has one.
    pub fn session(&mut self) -> Option<&mut MemorySession> {
        self.session.get_mut()
    }
}

impl TransactionImpl for MemoryTransaction {
    fn commit(&mut self) -> Result<(), DatabaseError> {
        self.db.enter(self.txn, Stage::Commit)?;

        let writes: Vec<Write> = self.staged.lock().drain(..).collect();
        let count = writes.len();
        let mut store = self.db.store.lock();
        for write in writes {
            match write {
                Write::Put(k, v) => {
                    store.insert(k, v);
                }
                Write::Delete(k) => {
                    store.remove(&k);
                }
            }
        }
        debug!(txn = self.txn, writes = count, "memory transaction applied");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.db.enter(self.txn, Stage::Rollback)?;

        self.staged.lock().clear();
        if let Some(session) = self.session.get_mut() {
            session.pending.clear();
        }
        Ok(())
    }

    fn own_session(&self) -> bool {
        self.session.is_open()
    }

    fn session_mut(&mut self) -> Option<&mut dyn Session> {
        self.session.as_session_mut()
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.close() {
            if !session.pending.is_empty() {
                debug!(
                    txn = self.txn,
                    pending = session.pending.len(),
                    "session released with unflushed objects"
                );
            }
        }
    }
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("txn", &self.txn)
            .field("staged", &self.staged_len())
            .field("session", &self.session.is_open())
            .finish()
    }
}

/// Per-transaction session of a [`MemoryDatabase`].
///
/// Holds objects by key until flushed. `None` marks an erased object.
pub struct MemorySession {
    txn: u64,
    db: Arc<MemoryInner>,
    pending: BTreeMap<String, Option<Vec<u8>>>,
    staged: Staging,
}

impl MemorySession {
    /// Track `value` under `key` until the next flush.
    pub fn persist(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.pending.insert(key.into(), Some(value.into()));
    }

    /// Track the removal of `key` until the next flush.
    pub fn erase(&mut self, key: impl Into<String>) {
        self.pending.insert(key.into(), None);
    }

    /// Pending object under `key`. `Some(None)` means erased.
    pub fn find(&self, key: &str) -> Option<Option<&[u8]>> {
        self.pending.get(key).map(|v| v.as_deref())
    }

    /// Number of unflushed objects.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Session for MemorySession {
    fn flush(&mut self) -> Result<(), DatabaseError> {
        self.db.enter(self.txn, Stage::Flush)?;

        let mut staged = self.staged.lock();
        for (key, value) in std::mem::take(&mut self.pending) {
            staged.push(match value {
                Some(v) => Write::Put(key, v),
                None => Write::Delete(key),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("txn", &self.txn)
            .field("pending", &self.pending.len())
            .finish()
    }
}
