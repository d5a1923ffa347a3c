//! Per-thread identity tokens
//!
//! `std::thread::ThreadId` cannot be stored in an atomic, so every thread
//! gets a nonzero `u64` token on first use. Zero is reserved for "no thread".

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<u64> = const { Cell::new(0) };
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadToken(u64);

impl ThreadToken {
    /// Sentinel meaning no thread
    pub const NONE: ThreadToken = ThreadToken(0);

    /// Token of the calling thread, allocated on first call
    #[inline]
    pub fn current() -> Self {
        CURRENT.with(|cell| {
            let token = cell.get();
            if token != 0 {
                return ThreadToken(token);
            }
            let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
            cell.set(token);
            ThreadToken(token)
        })
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_current(self) -> bool {
        !self.is_none() && self == Self::current()
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_u64(raw: u64) -> Self {
        ThreadToken(raw)
    }
}

impl fmt::Debug for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("ThreadToken(none)")
        } else {
            write!(f, "ThreadToken({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable_and_nonzero() {
        let a = ThreadToken::current();
        let b = ThreadToken::current();
        assert_eq!(a, b);
        assert!(!a.is_none());
        assert!(a.is_current());
    }

    #[test]
    fn threads_get_distinct_tokens() {
        let here = ThreadToken::current();
        let there = std::thread::spawn(ThreadToken::current).join().unwrap();
        assert_ne!(here, there);
        assert!(!there.is_current());
    }

    #[test]
    fn none_is_never_current() {
        assert!(!ThreadToken::NONE.is_current());
    }
}
