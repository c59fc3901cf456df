//! Transaction envelope for tessera
//!
//! This crate implements the unit-of-work lifecycle:
//! - Transaction: owns one backend, finalizes exactly once
//! - Ambient context: the current transaction of each thread
//! - TransactionImpl / Session / Database: the backend contracts
//! - MemoryDatabase: an ephemeral backend implementing those contracts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod context;
pub mod memory;
pub mod transaction;

pub use backend::{Database, Session, SessionSlot, TransactionImpl};
pub use memory::{
    JournalEvent, MemoryDatabase, MemoryDatabaseBuilder, MemorySession, MemoryTransaction, Stage,
    DEFAULT_JOURNAL_CAPACITY,
};
pub use transaction::{Transaction, TransactionRef, TxnId};

pub use tessera_core::{DatabaseError, DatabaseErrorKind, Error, Result};
