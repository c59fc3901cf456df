//! Main entry point for tessera.
//!
//! This module provides the `Tessera` struct, which begins transactions on a
//! configured [`Database`] backend.

use std::fmt;
use std::sync::Arc;
use tessera_transaction::{Database, MemoryDatabase, Result, Transaction};
use tracing::debug;

/// A handle to a database backend.
///
/// Cloning is cheap; clones share the backend.
///
/// # Example
///
/// ```ignore
/// use tessera::prelude::*;
///
/// let db = Tessera::ephemeral();
///
/// db.transaction(|txn| {
///     txn.with_impl(|t: &mut MemoryTransaction| t.put("user:1", "alice"))
/// })?;
/// ```
#[derive(Clone)]
pub struct Tessera {
    inner: Arc<dyn Database>,
}

impl Tessera {
    /// Wrap an existing backend.
    pub fn new(db: impl Database + 'static) -> Self {
        Self {
            inner: Arc::new(db),
        }
    }

    /// An in-memory database with default settings.
    ///
    /// Nothing touches the disk and all data is lost when the last clone is
    /// dropped.
    pub fn ephemeral() -> Self {
        Self::builder().open()
    }

    /// Create a builder for database configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Tessera::builder()
    ///     .session_per_transaction(true)
    ///     .open();
    /// ```
    pub fn builder() -> TesseraBuilder {
        TesseraBuilder::new()
    }

    /// The backend.
    pub fn database(&self) -> &dyn Database {
        &*self.inner
    }

    /// Start a transaction. It becomes this thread's current transaction.
    pub fn begin(&self) -> Result<Transaction> {
        Transaction::begin(&*self.inner)
    }

    /// Run `f` inside a new transaction.
    ///
    /// Commits when `f` returns `Ok` and the transaction is still active.
    /// When `f` returns `Err` the transaction is dropped, which rolls it back,
    /// and the error from `f` is returned. A failure of that rollback is only
    /// logged, so it never hides the error from `f`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                if !txn.is_finalized() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                debug!(txn = %txn.id(), error = %e, "transaction body failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Tessera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tessera").finish_non_exhaustive()
    }
}

/// Builder for database configuration.
///
/// # Example
///
/// ```ignore
/// // Ephemeral store, one session per transaction
/// let db = Tessera::builder()
///     .session_per_transaction(true)
///     .open();
///
/// // Prepared backend
/// let db = Tessera::builder()
///     .database(MemoryDatabase::builder().fail_on(Stage::Commit).build())
///     .open();
/// ```
pub struct TesseraBuilder {
    session_per_transaction: bool,
    database: Option<Arc<dyn Database>>,
}

impl TesseraBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            session_per_transaction: false,
            database: None,
        }
    }

    /// Give every transaction of the in-memory backend its own session.
    ///
    /// Ignored when a backend is supplied through
    /// [`database`](TesseraBuilder::database).
    pub fn session_per_transaction(mut self, enabled: bool) -> Self {
        self.session_per_transaction = enabled;
        self
    }

    /// Use `db` instead of a fresh in-memory backend.
    pub fn database(mut self, db: impl Database + 'static) -> Self {
        self.database = Some(Arc::new(db));
        self
    }

    /// Open the database.
    pub fn open(self) -> Tessera {
        let inner: Arc<dyn Database> = match self.database {
            Some(db) => db,
            None => Arc::new(
                MemoryDatabase::builder()
                    .session_per_transaction(self.session_per_transaction)
                    .build(),
            ),
        };
        Tessera { inner }
    }
}

impl Default for TesseraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
