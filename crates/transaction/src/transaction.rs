//! Scoped unit of work
//!
//! A [`Transaction`] owns one backend and is finalized exactly once:
//!
//! ```text
//! Active ──commit() ok──────────▶ Finalized
//!   │    ──commit() err─▶ Active (rollback still possible)
//!   │    ──rollback()───────────▶ Finalized (even if the backend fails)
//!   └────drop──▶ implicit rollback, errors logged ──▶ Finalized
//! ```
//!
//! Commit marks the transaction finalized only after the backend confirms.
//! Rollback marks it finalized before calling the backend so a failed
//! rollback is never retried.
//!
//! While alive, the transaction is the current transaction of its thread and
//! can be reached from anywhere on that thread through
//! [`Transaction::current`].

use crate::backend::{Database, TransactionImpl};
use crate::context;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::{Error, Result};
use tracing::{debug, warn};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(u64);

impl TxnId {
    fn next() -> Self {
        TxnId(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// State shared between the owning [`Transaction`] and its
/// [`TransactionRef`] handles.
pub(crate) struct TransactionState {
    id: TxnId,
    finalized: Cell<bool>,
    backend: RefCell<Option<Box<dyn TransactionImpl>>>,
}

impl TransactionState {
    pub(crate) fn id(&self) -> TxnId {
        self.id
    }

    fn commit(&self) -> Result<()> {
        if self.finalized.get() {
            return Err(Error::AlreadyFinalized);
        }

        let mut guard = self
            .backend
            .try_borrow_mut()
            .map_err(|_| Error::TransactionBusy)?;
        let backend = guard.as_mut().ok_or(Error::NotInTransaction)?;

        // Session-per-transaction mode: pending changes go out first.
        if backend.own_session() {
            let session = backend.session_mut().ok_or(Error::SessionMissing)?;
            session.flush()?;
        }

        backend.commit()?;
        self.finalized.set(true);
        debug!(txn = %self.id, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if self.finalized.get() {
            return Err(Error::AlreadyFinalized);
        }

        let mut guard = self
            .backend
            .try_borrow_mut()
            .map_err(|_| Error::TransactionBusy)?;
        let backend = guard.as_mut().ok_or(Error::NotInTransaction)?;

        self.finalized.set(true);
        backend.rollback()?;
        debug!(txn = %self.id, "transaction rolled back");
        Ok(())
    }

    fn with_impl<B, R, F>(&self, f: F) -> Result<R>
    where
        B: TransactionImpl,
        F: FnOnce(&mut B) -> R,
    {
        let mut guard = self
            .backend
            .try_borrow_mut()
            .map_err(|_| Error::TransactionBusy)?;
        let backend = guard.as_mut().ok_or(Error::NotInTransaction)?;
        let backend: &mut dyn Any = &mut **backend;
        let typed = backend
            .downcast_mut::<B>()
            .ok_or(Error::BackendMismatch {
                expected: std::any::type_name::<B>(),
            })?;
        Ok(f(typed))
    }
}

/// Owning handle of a unit of work.
///
/// Dropping an unfinalized transaction rolls it back. Failures of that
/// implicit rollback are logged at `warn` and never surface; call
/// [`rollback`](Transaction::rollback) explicitly to observe them.
///
/// # Example
///
/// ```ignore
/// let txn = Transaction::begin(&db)?;
/// txn.with_impl(|t: &mut MemoryTransaction| t.put("user:1", "alice"))?;
/// txn.commit()?;
/// ```
pub struct Transaction {
    state: Rc<TransactionState>,
}

impl Transaction {
    /// Take ownership of `backend` and become the current transaction of
    /// this thread.
    ///
    /// Whatever transaction was current before is replaced without further
    /// checks.
    pub fn new(backend: Box<dyn TransactionImpl>) -> Self {
        let state = Rc::new(TransactionState {
            id: TxnId::next(),
            finalized: Cell::new(false),
            backend: RefCell::new(Some(backend)),
        });

        if let Some(displaced) = context::install(&state) {
            warn!(
                txn = %state.id,
                displaced = %displaced,
                "replaced a live current transaction"
            );
        }
        debug!(txn = %state.id, "transaction started");

        Transaction { state }
    }

    /// Begin a backend transaction on `db` and wrap it.
    pub fn begin(db: &dyn Database) -> Result<Self> {
        let backend = db.begin()?;
        Ok(Self::new(backend))
    }

    /// Whether this thread has a current transaction.
    pub fn has_current() -> bool {
        context::has_current()
    }

    /// Handle to this thread's current transaction.
    ///
    /// Fails with [`Error::NotInTransaction`] when there is none.
    pub fn current() -> Result<TransactionRef> {
        context::current()
            .map(|state| TransactionRef::from_state(&state))
            .ok_or(Error::NotInTransaction)
    }

    /// Identifier of this transaction
    pub fn id(&self) -> TxnId {
        self.state.id
    }

    /// Whether commit or rollback already ran.
    pub fn is_finalized(&self) -> bool {
        self.state.finalized.get()
    }

    /// Commit the unit of work.
    ///
    /// Flushes the owned session first, if any. On a backend failure the
    /// transaction stays active and may still be rolled back.
    pub fn commit(&self) -> Result<()> {
        self.state.commit()
    }

    /// Roll back the unit of work.
    ///
    /// The transaction is finalized even when the backend fails.
    pub fn rollback(&self) -> Result<()> {
        self.state.rollback()
    }

    /// Run `f` against the backend, which must be a `B`.
    ///
    /// Fails with [`Error::BackendMismatch`] for any other backend type and
    /// with [`Error::TransactionBusy`] when called from inside a backend
    /// call of the same transaction.
    pub fn with_impl<B, R, F>(&self, f: F) -> Result<R>
    where
        B: TransactionImpl,
        F: FnOnce(&mut B) -> R,
    {
        self.state.with_impl(f)
    }

    /// A non-owning handle to this transaction.
    pub fn handle(&self) -> TransactionRef {
        TransactionRef::from_state(&self.state)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let id = self.state.id;

        if !self.state.finalized.get() {
            if let Err(e) = self.state.rollback() {
                warn!(txn = %id, error = %e, "implicit rollback failed, error discarded");
            }
        }

        if let Some(other) = context::clear().filter(|other| *other != id) {
            warn!(txn = %id, current = %other, "cleared another transaction from the current slot");
        }

        if let Ok(mut slot) = self.state.backend.try_borrow_mut() {
            if let Some(mut backend) = slot.take() {
                backend.release_session();
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.state.id)
            .field("finalized", &self.state.finalized.get())
            .finish()
    }
}

/// Non-owning handle to a [`Transaction`].
///
/// Obtained from [`Transaction::current`] or [`Transaction::handle`]. Once the
/// owning transaction is dropped every operation fails with
/// [`Error::NotInTransaction`].
#[derive(Clone)]
pub struct TransactionRef {
    id: TxnId,
    state: Weak<TransactionState>,
}

impl TransactionRef {
    fn from_state(state: &Rc<TransactionState>) -> Self {
        TransactionRef {
            id: state.id,
            state: Rc::downgrade(state),
        }
    }

    fn upgrade(&self) -> Result<Rc<TransactionState>> {
        self.state.upgrade().ok_or(Error::NotInTransaction)
    }

    /// Identifier of the referenced transaction
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Whether the owning transaction is still alive.
    pub fn is_live(&self) -> bool {
        self.state.strong_count() > 0
    }

    /// Whether commit or rollback already ran. A dropped transaction counts
    /// as finalized.
    pub fn is_finalized(&self) -> bool {
        self.state.upgrade().map_or(true, |s| s.finalized.get())
    }

    /// See [`Transaction::commit`].
    pub fn commit(&self) -> Result<()> {
        self.upgrade()?.commit()
    }

    /// See [`Transaction::rollback`].
    pub fn rollback(&self) -> Result<()> {
        self.upgrade()?.rollback()
    }

    /// See [`Transaction::with_impl`].
    pub fn with_impl<B, R, F>(&self, f: F) -> Result<R>
    where
        B: TransactionImpl,
        F: FnOnce(&mut B) -> R,
    {
        self.upgrade()?.with_impl(f)
    }
}

impl PartialEq for TransactionRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransactionRef {}

impl PartialEq<Transaction> for TransactionRef {
    fn eq(&self, other: &Transaction) -> bool {
        self.id == other.id()
    }
}

impl PartialEq<TransactionRef> for Transaction {
    fn eq(&self, other: &TransactionRef) -> bool {
        self.id() == other.id
    }
}

impl fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRef")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}
