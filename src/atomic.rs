//! Atomic counters - lock-free bookkeeping primitives
//!
//! Design: thin typed wrappers over `std::sync::atomic` with the
//! sequentially-consistent ordering of a plain `std::atomic<T>`.
//! Copying a counter takes a snapshot of its value.

use std::fmt;
use std::sync::atomic::{
    AtomicBool, AtomicI32, AtomicI64, AtomicIsize, AtomicU32, AtomicU64, AtomicUsize, Ordering,
};

const ORDER: Ordering = Ordering::SeqCst;

/// Integer types with a matching std atomic
pub trait AtomicInteger: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    type Atomic: Send + Sync;

    const ZERO: Self;
    const ONE: Self;

    fn new_atomic(value: Self) -> Self::Atomic;
    fn load(atomic: &Self::Atomic) -> Self;
    fn store(atomic: &Self::Atomic, value: Self);
    fn swap(atomic: &Self::Atomic, value: Self) -> Self;
    fn fetch_add(atomic: &Self::Atomic, value: Self) -> Self;
    fn fetch_sub(atomic: &Self::Atomic, value: Self) -> Self;
    fn compare_exchange(atomic: &Self::Atomic, current: Self, new: Self) -> Result<Self, Self>;
}

macro_rules! impl_atomic_integer {
    ($($int:ty => $atomic:ty),* $(,)?) => {
        $(
            impl AtomicInteger for $int {
                type Atomic = $atomic;

                const ZERO: Self = 0;
                const ONE: Self = 1;

                #[inline]
                fn new_atomic(value: Self) -> Self::Atomic {
                    <$atomic>::new(value)
                }

                #[inline]
                fn load(atomic: &Self::Atomic) -> Self {
                    atomic.load(ORDER)
                }

                #[inline]
                fn store(atomic: &Self::Atomic, value: Self) {
                    atomic.store(value, ORDER)
                }

                #[inline]
                fn swap(atomic: &Self::Atomic, value: Self) -> Self {
                    atomic.swap(value, ORDER)
                }

                #[inline]
                fn fetch_add(atomic: &Self::Atomic, value: Self) -> Self {
                    atomic.fetch_add(value, ORDER)
                }

                #[inline]
                fn fetch_sub(atomic: &Self::Atomic, value: Self) -> Self {
                    atomic.fetch_sub(value, ORDER)
                }

                #[inline]
                fn compare_exchange(atomic: &Self::Atomic, current: Self, new: Self) -> Result<Self, Self> {
                    atomic.compare_exchange(current, new, ORDER, ORDER)
                }
            }
        )*
    };
}

impl_atomic_integer! {
    i32 => AtomicI32,
    u32 => AtomicU32,
    i64 => AtomicI64,
    u64 => AtomicU64,
    isize => AtomicIsize,
    usize => AtomicUsize,
}

/// Atomic integer counter
///
/// All operations are indivisible with respect to other threads; no lock
/// is taken.
pub struct AtomicCounter<T: AtomicInteger> {
    value: T::Atomic,
}

impl<T: AtomicInteger> AtomicCounter<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self { value: T::new_atomic(value) }
    }

    #[inline]
    pub fn get(&self) -> T {
        T::load(&self.value)
    }

    #[inline]
    pub fn set(&self, value: T) {
        T::store(&self.value, value)
    }

    /// Replace the value, returning the previous one
    #[inline]
    pub fn swap(&self, value: T) -> T {
        T::swap(&self.value, value)
    }

    #[inline]
    pub fn add(&self, value: T) {
        T::fetch_add(&self.value, value);
    }

    #[inline]
    pub fn sub(&self, value: T) {
        T::fetch_sub(&self.value, value);
    }

    /// Post-increment: returns the value before the increment
    #[inline]
    pub fn increment(&self) -> T {
        T::fetch_add(&self.value, T::ONE)
    }

    /// Pre-decrement: returns true if the counter is nonzero afterwards
    #[inline]
    pub fn decrement(&self) -> bool {
        self.fetch_decrement() != T::ONE
    }

    /// Returns the value before the decrement
    #[inline]
    pub fn fetch_decrement(&self) -> T {
        T::fetch_sub(&self.value, T::ONE)
    }

    /// Store `new` if the counter equals `current`.
    ///
    /// Returns the previous value in `Ok` on success, or the observed value
    /// in `Err`.
    #[inline]
    pub fn compare_exchange(&self, current: T, new: T) -> Result<T, T> {
        T::compare_exchange(&self.value, current, new)
    }
}

impl<T: AtomicInteger> Default for AtomicCounter<T> {
    fn default() -> Self {
        Self::new(T::ZERO)
    }
}

impl<T: AtomicInteger> Clone for AtomicCounter<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: AtomicInteger> From<T> for AtomicCounter<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: AtomicInteger> fmt::Debug for AtomicCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCounter").field(&self.get()).finish()
    }
}

pub type AtomicS32 = AtomicCounter<i32>;
pub type AtomicU32Counter = AtomicCounter<u32>;

/// Atomic boolean flag
#[derive(Default)]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    #[inline]
    pub const fn new(value: bool) -> Self {
        Self { value: AtomicBool::new(value) }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(ORDER)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, ORDER)
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, ORDER)
    }

    #[inline]
    pub fn compare_exchange(&self, current: bool, new: bool) -> Result<bool, bool> {
        self.value.compare_exchange(current, new, ORDER, ORDER)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl fmt::Debug for AtomicFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicFlag").field(&self.get()).finish()
    }
}
