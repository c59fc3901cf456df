//! Object pointer adapters
//!
//! The persistence layer hands objects back to callers through whatever
//! pointer family the application chose. [`PointerTraits`] is the fixed
//! operation set the layer relies on:
//!
//! | Operation | Meaning |
//! |-----------|---------|
//! | `get_ptr` | Raw address of the pointee, null when empty |
//! | `get_ref` | Reference to the pointee (panics when empty) |
//! | `null_ptr` | Whether the pointer holds nothing |
//! | `allocate` | Uninitialized storage for one pointee |
//! | `free` | Release storage that never received a value |
//! | `adopt` | Write a value into storage and take ownership |
//!
//! ## Resolution
//!
//! There are two implementations:
//!
//! 1. [`Shared<T>`], the first-party reference-counted pointer. Its storage
//!    comes from the shared channel (`Arc::new_uninit`), which places the
//!    reference counts and the object in one allocation.
//! 2. `Option<P>` for any `P: AdoptInPlace`. Storage comes from the global
//!    channel through the family's own uninitialized constructor
//!    (`Box::new_uninit`, `Rc::new_uninit`, `Arc::new_uninit`), and `adopt`
//!    initializes that same block. The value is never moved into a second
//!    allocation. Third-party pointers opt in by implementing
//!    [`AdoptInPlace`], usually by delegating to the std pointer they wrap.
//!
//! `allocate` and `free` must pair within one implementation. The associated
//! `Storage` type makes mixing channels a type error.

use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::ptr;
use std::rc::Rc;
use std::sync::Arc;

/// Uniform operations over a pointer family.
///
/// Implementations are stateless; `Self` is the pointer value itself.
pub trait PointerTraits: Sized {
    /// Pointee type
    type Target;

    /// Uninitialized storage for one pointee, from this family's channel
    type Storage;

    /// The empty pointer of this family.
    fn null() -> Self;

    /// Underlying address, or null when the pointer holds nothing.
    fn get_ptr(&self) -> *const Self::Target;

    /// Reference to the pointee.
    ///
    /// # Panics
    ///
    /// Panics when the pointer is null. Callers are expected to check
    /// [`null_ptr`](PointerTraits::null_ptr) first, the same way they would
    /// before dereferencing.
    fn get_ref(&self) -> &Self::Target;

    /// True iff the pointer holds no object.
    fn null_ptr(&self) -> bool {
        self.get_ptr().is_null()
    }

    /// Obtain storage for one pointee without constructing it.
    fn allocate() -> Self::Storage;

    /// Release storage from [`allocate`](PointerTraits::allocate) that never
    /// received a value.
    fn free(storage: Self::Storage);

    /// Move `value` into `storage` and hand ownership to a new pointer.
    fn adopt(storage: Self::Storage, value: Self::Target) -> Self;

    /// Allocate, construct with `init`, and wrap.
    ///
    /// If `init` fails the storage is freed and no pointer is produced.
    fn construct<E, F>(init: F) -> std::result::Result<Self, E>
    where
        F: FnOnce() -> std::result::Result<Self::Target, E>,
    {
        let storage = Self::allocate();
        match init() {
            Ok(value) => Ok(Self::adopt(storage, value)),
            Err(e) => {
                Self::free(storage);
                Err(e)
            }
        }
    }
}

// ============================================================================
// Global channel
// ============================================================================

/// Pointer families that reserve storage for one pointee and later take
/// ownership of that same storage.
pub trait AdoptInPlace: Deref + Sized
where
    Self::Target: Sized,
{
    /// Reserved, uninitialized storage for one pointee
    type Uninit;

    /// Reserve storage without constructing a value.
    fn new_uninit() -> Self::Uninit;

    /// Address the pointee will occupy once initialized.
    fn uninit_ptr(storage: &Self::Uninit) -> *const Self::Target;

    /// Write `value` into `storage` and take ownership of the block.
    fn init(storage: Self::Uninit, value: Self::Target) -> Self;
}

impl<T> AdoptInPlace for Box<T> {
    type Uninit = Box<MaybeUninit<T>>;

    fn new_uninit() -> Self::Uninit {
        Box::<T>::new_uninit()
    }

    fn uninit_ptr(storage: &Self::Uninit) -> *const T {
        (**storage).as_ptr()
    }

    fn init(mut storage: Self::Uninit, value: T) -> Self {
        storage.write(value);
        // SAFETY: the slot was fully written on the line above.
        unsafe { storage.assume_init() }
    }
}

impl<T> AdoptInPlace for Rc<T> {
    type Uninit = Rc<MaybeUninit<T>>;

    fn new_uninit() -> Self::Uninit {
        Rc::<T>::new_uninit()
    }

    fn uninit_ptr(storage: &Self::Uninit) -> *const T {
        (**storage).as_ptr()
    }

    fn init(mut storage: Self::Uninit, value: T) -> Self {
        match Rc::get_mut(&mut storage) {
            Some(slot) => {
                slot.write(value);
                // SAFETY: the object slot was fully written above.
                unsafe { storage.assume_init() }
            }
            None => Rc::new(value),
        }
    }
}

impl<T> AdoptInPlace for Arc<T> {
    type Uninit = Arc<MaybeUninit<T>>;

    fn new_uninit() -> Self::Uninit {
        Arc::<T>::new_uninit()
    }

    fn uninit_ptr(storage: &Self::Uninit) -> *const T {
        (**storage).as_ptr()
    }

    fn init(mut storage: Self::Uninit, value: T) -> Self {
        match Arc::get_mut(&mut storage) {
            Some(slot) => {
                slot.write(value);
                // SAFETY: the object slot was fully written above.
                unsafe { storage.assume_init() }
            }
            None => Arc::new(value),
        }
    }
}

/// Storage from the global allocation channel.
///
/// Holds the only reference to a block reserved by `P`.
pub struct GlobalStorage<P>(P::Uninit)
where
    P: AdoptInPlace,
    P::Target: Sized;

impl<P> GlobalStorage<P>
where
    P: AdoptInPlace,
    P::Target: Sized,
{
    /// Address of the reserved storage
    pub fn as_ptr(&self) -> *const P::Target {
        P::uninit_ptr(&self.0)
    }
}

impl<P> fmt::Debug for GlobalStorage<P>
where
    P: AdoptInPlace,
    P::Target: Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalStorage").field(&self.as_ptr()).finish()
    }
}

impl<P> PointerTraits for Option<P>
where
    P: AdoptInPlace,
    P::Target: Sized,
{
    type Target = P::Target;
    type Storage = GlobalStorage<P>;

    fn null() -> Self {
        None
    }

    fn get_ptr(&self) -> *const Self::Target {
        match self {
            Some(p) => &**p as *const Self::Target,
            None => ptr::null(),
        }
    }

    fn get_ref(&self) -> &Self::Target {
        match self {
            Some(p) => p,
            None => panic!("dereferenced a null object pointer"),
        }
    }

    fn null_ptr(&self) -> bool {
        self.is_none()
    }

    fn allocate() -> Self::Storage {
        GlobalStorage(P::new_uninit())
    }

    fn free(storage: Self::Storage) {
        // MaybeUninit never drops its contents, so only the memory goes.
        drop(storage.0);
    }

    fn adopt(storage: Self::Storage, value: Self::Target) -> Self {
        Some(P::init(storage.0, value))
    }
}

// ============================================================================
// Shared channel
// ============================================================================

/// Storage from the shared allocation channel.
///
/// Holds the only reference to a fresh `Arc` allocation, counts included.
pub struct SharedStorage<T>(Arc<MaybeUninit<T>>);

impl<T> SharedStorage<T> {
    /// Address of the reserved object slot
    pub fn as_ptr(&self) -> *const T {
        (*self.0).as_ptr()
    }
}

impl<T> fmt::Debug for SharedStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedStorage").field(&self.as_ptr()).finish()
    }
}

/// First-party reference-counted object pointer.
///
/// A nullable `Arc`. Cloning shares the object; the object is dropped with
/// the last clone.
pub struct Shared<T>(Option<Arc<T>>);

impl<T> Shared<T> {
    /// Allocate `value` behind a new pointer.
    pub fn new(value: T) -> Self {
        Shared(Some(Arc::new(value)))
    }

    /// The empty pointer.
    pub fn null() -> Self {
        Shared(None)
    }

    /// True iff this pointer holds no object.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Reference to the object, if any.
    pub fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }

    /// Number of pointers sharing the object (0 for null).
    pub fn use_count(&self) -> usize {
        self.0.as_ref().map_or(0, Arc::strong_count)
    }

    /// True iff both pointers refer to the same object. Two nulls are equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Release the object and leave this pointer null.
    pub fn reset(&mut self) {
        self.0 = None;
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Shared(None)
    }
}

impl<T> From<Arc<T>> for Shared<T> {
    fn from(arc: Arc<T>) -> Self {
        Shared(Some(arc))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => f.debug_tuple("Shared").field(v).finish(),
            None => f.write_str("Shared(null)"),
        }
    }
}

impl<T> PointerTraits for Shared<T> {
    type Target = T;
    type Storage = SharedStorage<T>;

    fn null() -> Self {
        Shared(None)
    }

    fn get_ptr(&self) -> *const T {
        self.0.as_ref().map_or(ptr::null(), Arc::as_ptr)
    }

    fn get_ref(&self) -> &T {
        match &self.0 {
            Some(v) => v,
            None => panic!("dereferenced a null Shared pointer"),
        }
    }

    fn null_ptr(&self) -> bool {
        self.0.is_none()
    }

    fn allocate() -> Self::Storage {
        SharedStorage(Arc::new_uninit())
    }

    fn free(storage: Self::Storage) {
        drop(storage.0);
    }

    fn adopt(storage: Self::Storage, value: T) -> Self {
        let mut arc = storage.0;
        match Arc::get_mut(&mut arc) {
            Some(slot) => {
                slot.write(value);
                // SAFETY: the object slot was fully written above.
                Shared(Some(unsafe { arc.assume_init() }))
            }
            // SharedStorage is never cloned, so the allocation is unique.
            // Should that ever change, fall back to a fresh allocation.
            None => Shared::new(value),
        }
    }
}
