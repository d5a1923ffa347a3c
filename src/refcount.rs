//! Intrusive thread-safe reference counting
//!
//! An object embeds a [`ThreadSafeRefCount`] and implements [`RefCounted`];
//! [`RefPtr`] owns one reference and frees the object, exactly once, when
//! the count it releases reaches zero. The count starts at zero: creating
//! the first `RefPtr` takes the first reference.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::atomic::AtomicCounter;
use crate::error::contract_violation;

pub struct ThreadSafeRefCount {
    count: AtomicCounter<i32>,
}

impl ThreadSafeRefCount {
    pub fn new() -> Self {
        Self {
            count: AtomicCounter::new(0),
        }
    }

    #[inline]
    pub fn add_ref(&self) {
        self.count.increment();
    }

    /// Drop one reference. Returns true when it was the last one.
    ///
    /// Only [`RefPtr`] releases: a handle gives up its reference exactly
    /// when it is dropped.
    #[must_use = "the owner must destroy the object when this returns true"]
    #[track_caller]
    pub(crate) fn release(&self) -> bool {
        let previous = self.count.fetch_decrement();
        if previous <= 0 {
            contract_violation("reference count released below zero");
        }
        previous == 1
    }

    #[inline]
    pub fn num_refs(&self) -> i32 {
        self.count.get()
    }
}

impl Default for ThreadSafeRefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadSafeRefCount {
    fn drop(&mut self) {
        if self.count.get() != 0 && !std::thread::panicking() {
            contract_violation("reference-counted object destroyed with live references");
        }
    }
}

impl fmt::Debug for ThreadSafeRefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadSafeRefCount({})", self.num_refs())
    }
}

/// An object carrying its own reference count
///
/// # Safety
/// `ref_count` must return a counter embedded in `self`: the same counter on
/// every call, and one that no other object reports. [`RefPtr`] frees the
/// object and hands out `&mut` access based on that count.
///
/// ```compile_fail
/// use weft::{RefCounted, RefPtr, BufferArray};
///
/// let a = RefPtr::new(BufferArray::new());
/// let _ = a.ref_count().release();
/// ```
pub unsafe trait RefCounted {
    fn ref_count(&self) -> &ThreadSafeRefCount;

    fn add_ref(&self) {
        self.ref_count().add_ref();
    }

    fn num_refs(&self) -> i32 {
        self.ref_count().num_refs()
    }
}

/// Owning pointer holding one reference to a heap-allocated [`RefCounted`]
pub struct RefPtr<T: ?Sized + RefCounted> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

// SAFETY: the count is atomic and the last release frees on whichever
// thread performs it, so `T` must be shareable and sendable.
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Send for RefPtr<T> {}
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Sync for RefPtr<T> {}

impl<T: RefCounted> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized + RefCounted> RefPtr<T> {
    /// Take ownership of a boxed object and its first reference
    pub fn from_box(value: Box<T>) -> Self {
        value.add_ref();
        Self {
            ptr: NonNull::from(Box::leak(value)),
            _owns: PhantomData,
        }
    }

    /// Give up this handle without releasing its reference
    pub fn into_raw(this: Self) -> *const T {
        let ptr = this.ptr.as_ptr() as *const T;
        std::mem::forget(this);
        ptr
    }

    /// Re-adopt a reference produced by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` (or be an object that a `RefPtr`
    /// allocated and for which the caller owns one counted reference).
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        Self {
            // SAFETY: non-null by the caller's contract.
            ptr: NonNull::new_unchecked(ptr as *mut T),
            _owns: PhantomData,
        }
    }

    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr() as *const T
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr.cast::<u8>() == b.ptr.cast::<u8>()
    }

    /// Mutable access while this is the only reference
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.num_refs() == 1 {
            // SAFETY: a count of one means no other `RefPtr` or raw
            // reference exists, and `this` is borrowed mutably.
            Some(unsafe { this.ptr.as_mut() })
        } else {
            None
        }
    }
}

/// Release one reference held through a raw pointer, freeing the object if
/// it was the last.
///
/// # Safety
/// Same as [`RefPtr::from_raw`]; the pointer must not be used afterwards
/// unless the caller still holds another reference.
pub unsafe fn release_raw<T: ?Sized + RefCounted>(ptr: *const T) {
    drop(RefPtr::from_raw(ptr));
}

impl<T: ?Sized + RefCounted> Clone for RefPtr<T> {
    fn clone(&self) -> Self {
        self.add_ref();
        Self {
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized + RefCounted> Deref for RefPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: our reference keeps the object alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized + RefCounted> Drop for RefPtr<T> {
    fn drop(&mut self) {
        if self.ref_count().release() {
            // SAFETY: allocated by `from_box`; the count reached zero so no
            // other handle remains.
            unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        }
    }
}

impl<T: ?Sized + RefCounted + fmt::Debug> fmt::Debug for RefPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Completion callback that lives as long as someone references it
pub trait Responder: RefCounted + Send + Sync {
    fn completed(&self, success: bool);
}

/// Deliver a completion and drop the caller's reference.
///
/// A responder nobody else holds is destroyed right after the call.
pub fn respond(responder: RefPtr<dyn Responder>, success: bool) {
    responder.completed(success);
}
