//! Ambient current-transaction slot
//!
//! Each thread has one slot holding a non-owning reference to the
//! transaction most recently started on it. A [`Transaction`] installs itself
//! on construction and clears the slot when dropped.
//!
//! The slot has a single writer per thread. Starting a second transaction
//! while one is live replaces the first, and dropping either clears the slot.
//! Transactions are `!Send`, so a slot never refers to a transaction owned by
//! another thread.
//!
//! [`Transaction`]: crate::Transaction

use crate::transaction::{TransactionState, TxnId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

thread_local! {
    static CURRENT: RefCell<Option<Weak<TransactionState>>> = const { RefCell::new(None) };
}

/// Make `state` current. Returns the id of a live transaction it displaced.
///
/// Once the slot has been destroyed during thread teardown nothing is
/// installed and nothing is displaced.
pub(crate) fn install(state: &Rc<TransactionState>) -> Option<TxnId> {
    CURRENT
        .try_with(|slot| slot.borrow_mut().replace(Rc::downgrade(state)))
        .ok()
        .flatten()
        .and_then(|w| w.upgrade())
        .map(|s| s.id())
}

/// Empty the slot. Returns the id of the live transaction that was current,
/// if any.
pub(crate) fn clear() -> Option<TxnId> {
    // The slot may already be gone while thread-local destructors run.
    CURRENT
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
        .and_then(|w| w.upgrade())
        .map(|s| s.id())
}

/// The live current transaction, if any.
pub(crate) fn current() -> Option<Rc<TransactionState>> {
    CURRENT
        .try_with(|slot| slot.borrow().as_ref().and_then(Weak::upgrade))
        .ok()
        .flatten()
}

/// Whether this thread has a current transaction.
pub fn has_current() -> bool {
    current().is_some()
}

/// Id of this thread's current transaction.
pub fn current_id() -> Option<TxnId> {
    current().map(|s| s.id())
}
