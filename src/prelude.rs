//! Convenient imports for tessera.
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Tessera::ephemeral();
//! let txn = db.begin()?;
//! txn.commit()?;
//! ```

// Main entry point
pub use crate::database::{Tessera, TesseraBuilder};

// Error handling
pub use crate::{DatabaseError, DatabaseErrorKind, Error, Result};

// Transactions
pub use crate::{Database, Session, Transaction, TransactionImpl, TransactionRef};

// In-memory backend
pub use crate::{MemoryDatabase, MemoryTransaction, Stage};

// Pointers
pub use crate::{PointerTraits, Shared};
