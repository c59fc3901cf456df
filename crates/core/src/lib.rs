//! Core types for tessera
//!
//! This crate defines the pieces every other layer of the persistence
//! runtime depends on:
//! - Error: errors raised by the transaction envelope
//! - DatabaseError: the backend error family
//! - PointerTraits: uniform operations over object pointer families
//! - Shared: the first-party reference-counted object pointer
//! - AdoptInPlace: pointer families that take ownership of their own storage

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pointer;

pub use error::{DatabaseError, DatabaseErrorKind, Error, Result};
pub use pointer::{AdoptInPlace, PointerTraits, Shared};
