//! # Tessera
//!
//! Transaction envelope and object pointer adapters for a persistence
//! runtime.
//!
//! A [`Transaction`] wraps one backend unit of work, is reachable from
//! anywhere on its thread through [`Transaction::current`], and is committed
//! or rolled back exactly once. Dropping it without finalizing rolls it back.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Tessera::ephemeral();
//!
//! let txn = db.begin()?;
//! save_user("user:1", "alice")?;   // uses Transaction::current()
//! txn.commit()?;
//!
//! fn save_user(key: &str, name: &str) -> Result<()> {
//!     Transaction::current()?
//!         .with_impl(|t: &mut MemoryTransaction| t.put(key, name))
//! }
//! ```
//!
//! ## Pointers
//!
//! [`PointerTraits`] lets the runtime build and inspect objects behind any
//! pointer family: the first-party [`Shared`], or `Option<P>` for `Box`,
//! `Rc`, `Arc` and third-party pointers implementing [`AdoptInPlace`].

#![warn(missing_docs)]

mod database;

pub mod prelude;

// Re-export main entry points
pub use database::{Tessera, TesseraBuilder};

// Re-export the envelope
pub use tessera_transaction::{
    context, Database, JournalEvent, MemoryDatabase, MemoryDatabaseBuilder, MemorySession,
    MemoryTransaction, Session, SessionSlot, Stage, Transaction, TransactionImpl,
    TransactionRef, TxnId,
};

// Re-export core types
pub use tessera_core::pointer::{GlobalStorage, SharedStorage};
pub use tessera_core::{
    AdoptInPlace, DatabaseError, DatabaseErrorKind, Error, PointerTraits, Result, Shared,
};
