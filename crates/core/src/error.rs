//! Error types for the transaction envelope.
//!
//! Two layers:
//! - [`DatabaseError`] is what backends, sessions and databases raise.
//! - [`Error`] is what the transaction envelope raises. It wraps
//!   [`DatabaseError`] unchanged so callers can still inspect the backend
//!   failure after it crossed `commit()` or `rollback()`.

use std::fmt;
use thiserror::Error;

/// Coarse classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Connection lost or could not be acquired
    Connection,
    /// Backend aborted the unit of work to break a deadlock
    Deadlock,
    /// Lock wait or statement timeout
    Timeout,
    /// Integrity constraint rejected the changes
    Constraint,
    /// Anything else the backend reports
    Other,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseErrorKind::Connection => "connection",
            DatabaseErrorKind::Deadlock => "deadlock",
            DatabaseErrorKind::Timeout => "timeout",
            DatabaseErrorKind::Constraint => "constraint",
            DatabaseErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure reported by a database backend, session or database factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("database error ({kind}): {message}")]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
    message: String,
}

impl DatabaseError {
    /// Create a database error of the given kind
    pub fn new(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`DatabaseErrorKind::Connection`]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Connection, message)
    }

    /// Shorthand for [`DatabaseErrorKind::Deadlock`]
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Deadlock, message)
    }

    /// Shorthand for [`DatabaseErrorKind::Timeout`]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Timeout, message)
    }

    /// Shorthand for [`DatabaseErrorKind::Constraint`]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Constraint, message)
    }

    /// Shorthand for [`DatabaseErrorKind::Other`]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Other, message)
    }

    /// Failure classification
    pub fn kind(&self) -> DatabaseErrorKind {
        self.kind
    }

    /// Backend-provided message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if the whole unit of work may succeed when run again.
    ///
    /// Only deadlocks and timeouts qualify. Nothing in this crate retries;
    /// the flag is for callers that drive their own retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::Deadlock | DatabaseErrorKind::Timeout
        )
    }
}

/// Errors raised by the transaction envelope.
#[derive(Debug, Error)]
pub enum Error {
    /// `commit()` or `rollback()` on a transaction that already finalized
    #[error("transaction already finalized")]
    AlreadyFinalized,

    /// No transaction is current on this thread
    #[error("operation is not performed in a transaction")]
    NotInTransaction,

    /// A backend call re-entered the transaction it was called from
    #[error("transaction is busy with another operation")]
    TransactionBusy,

    /// The backend claims to own a session but did not provide one
    #[error("transaction backend owns a session but exposes none")]
    SessionMissing,

    /// Typed backend access asked for the wrong implementation
    #[error("transaction backend is not a {expected}")]
    BackendMismatch {
        /// Type name that was requested
        expected: &'static str,
    },

    /// Backend, session or database failure, propagated unchanged
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type for transaction envelope operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error came from the backend.
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Database(_))
    }

    /// Backend error, if this is one.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match self {
            Error::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Contract violations are never retryable; backend errors defer to
    /// [`DatabaseError::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.as_database().is_some_and(DatabaseError::is_retryable)
    }
}
