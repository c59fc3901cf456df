//! Backend contracts consumed by [`Transaction`](crate::Transaction)
//!
//! - [`Database`] begins backend transactions.
//! - [`TransactionImpl`] performs commit and rollback against the data source
//!   and may own a per-transaction session.
//! - [`Session`] is flushed before commit when the backend owns one.
//! - [`SessionSlot`] holds an embedded session by value for backends.

use std::any::Any;
use std::fmt;
use tessera_core::DatabaseError;

/// Pending-changes tracker that can be written out before commit.
pub trait Session {
    /// Write all pending changes into the enclosing backend transaction.
    fn flush(&mut self) -> Result<(), DatabaseError>;
}

/// Store-specific half of a transaction.
///
/// Owned exclusively by one [`Transaction`](crate::Transaction) and dropped
/// together with it. `commit` and `rollback` are each called at most once
/// with success; a failed `commit` may be followed by `rollback`.
pub trait TransactionImpl: Any {
    /// Make the unit of work durable.
    fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Discard the unit of work.
    fn rollback(&mut self) -> Result<(), DatabaseError>;

    /// Whether this backend owns a session that must be flushed on commit.
    ///
    /// When this returns `true`, [`session_mut`](TransactionImpl::session_mut)
    /// must return `Some`.
    fn own_session(&self) -> bool {
        false
    }

    /// The owned session, if any.
    fn session_mut(&mut self) -> Option<&mut dyn Session> {
        None
    }

    /// End the owned session. Called once, right before the backend is
    /// dropped.
    fn release_session(&mut self) {}
}

/// Factory of backend transactions.
pub trait Database: Send + Sync {
    /// Start a new unit of work on the data source.
    fn begin(&self) -> Result<Box<dyn TransactionImpl>, DatabaseError>;
}

/// Embedded session storage.
///
/// The session lives inside the backend value rather than behind its own
/// allocation. `open` and `close` bound its lifetime explicitly; dropping the
/// slot closes it.
pub struct SessionSlot<S> {
    session: Option<S>,
}

impl<S> SessionSlot<S> {
    /// A slot with no session.
    pub fn empty() -> Self {
        Self { session: None }
    }

    /// A slot holding `session`.
    pub fn with(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Start a session, returning the one it replaced.
    pub fn open(&mut self, session: S) -> Option<S> {
        self.session.replace(session)
    }

    /// End the session and hand it back.
    pub fn close(&mut self) -> Option<S> {
        self.session.take()
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The open session.
    pub fn get(&self) -> Option<&S> {
        self.session.as_ref()
    }

    /// The open session, mutably.
    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }
}

impl<S: Session + 'static> SessionSlot<S> {
    /// The open session as a trait object, for
    /// [`TransactionImpl::session_mut`].
    pub fn as_session_mut(&mut self) -> Option<&mut dyn Session> {
        self.session.as_mut().map(|s| s as &mut dyn Session)
    }
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: fmt::Debug> fmt::Debug for SessionSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(s) => f.debug_tuple("SessionSlot").field(s).finish(),
            None => f.write_str("SessionSlot(empty)"),
        }
    }
}
