//! Reader/writer lock with writer priority
//!
//! Built from the crate's own [`Mutex`] and [`Condition`]. A waiting writer
//! holds `writer_waiting`, and ordinary readers that see the flag queue on
//! that mutex behind it. High-priority readers skip the queue.
//!
//! The holder count is `-1` while a writer owns the lock.

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use super::condition::Condition;
use super::mutex::Mutex;
use crate::atomic::AtomicFlag;

const WRITER: i32 = -1;

pub struct PriorityRwLock<T: ?Sized> {
    writer_waiting: Mutex<()>,
    no_holders: Condition<Cell<i32>>,
    writer_is_waiting: AtomicFlag,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for PriorityRwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for PriorityRwLock<T> {}

impl<T> PriorityRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            writer_waiting: Mutex::new(()),
            no_holders: Condition::new(Cell::new(0)),
            writer_is_waiting: AtomicFlag::new(false),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> PriorityRwLock<T> {
    /// Shared access; yields to a waiting writer
    pub fn read(&self) -> ReadGuard<'_, T> {
        self.rdlock(false);
        ReadGuard { lock: self }
    }

    /// Shared access that does not yield to a waiting writer
    pub fn read_high_priority(&self) -> ReadGuard<'_, T> {
        self.rdlock(true);
        ReadGuard { lock: self }
    }

    /// Exclusive access
    pub fn write(&self) -> WriteGuard<'_, T> {
        self.wrlock();
        WriteGuard { lock: self }
    }

    /// True while any reader or writer holds the lock
    pub fn is_locked(&self) -> bool {
        self.no_holders.lock().get() != 0
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn rdlock(&self, high_priority: bool) {
        // Racy on purpose: a stale read only changes who goes first.
        if self.writer_is_waiting.get() && !high_priority {
            // The writer owns this mutex until it has the lock.
            drop(self.writer_waiting.lock());
        }
        let mut holders = self.no_holders.lock();
        self.no_holders.wait_while(&mut holders, |h| h.get() == WRITER);
        holders.set(holders.get() + 1);
    }

    fn rdunlock(&self) {
        let holders = self.no_holders.lock();
        let remaining = holders.get() - 1;
        holders.set(remaining);
        if remaining == 0 {
            // Broadcast: a queued writer and an upgrading reader can both be
            // waiting here, and one signal could wake a blocked reader instead.
            self.no_holders.broadcast();
        }
    }

    fn wrlock(&self) {
        let queue = self.writer_waiting.lock();
        self.writer_is_waiting.set(true);
        let mut holders = self.no_holders.lock();
        self.no_holders.wait_while(&mut holders, |h| h.get() != 0);
        self.writer_is_waiting.set(false);
        drop(queue);
        holders.set(WRITER);
    }

    fn wrunlock(&self) {
        let holders = self.no_holders.lock();
        holders.set(0);
        self.no_holders.broadcast();
    }

    fn rd2wrlock(&self) {
        let mut holders = self.no_holders.lock();
        holders.set(holders.get() - 1);
        if holders.get() > 0 {
            // A writer already queued keeps the queue; we wait beside it.
            let queue = self.writer_waiting.try_lock();
            if queue.is_some() {
                self.writer_is_waiting.set(true);
            }
            self.no_holders.wait_while(&mut holders, |h| h.get() != 0);
            if queue.is_some() {
                self.writer_is_waiting.set(false);
            }
        }
        holders.set(WRITER);
    }

    fn wr2rdlock(&self) {
        let holders = self.no_holders.lock();
        holders.set(1);
        self.no_holders.broadcast();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for PriorityRwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityRwLock")
            .field("holders", &self.no_holders.lock().get())
            .field("writer_is_waiting", &self.writer_is_waiting.get())
            .finish()
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a PriorityRwLock<T>,
}

impl<'a, T: ?Sized> ReadGuard<'a, T> {
    /// Turn shared access into exclusive access.
    ///
    /// Waits for the other readers to leave.
    pub fn upgrade(self) -> WriteGuard<'a, T> {
        let this = ManuallyDrop::new(self);
        this.lock.rd2wrlock();
        WriteGuard { lock: this.lock }
    }
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: readers only get shared references while no writer holds
        // the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.rdunlock();
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a PriorityRwLock<T>,
}

impl<'a, T: ?Sized> WriteGuard<'a, T> {
    /// Turn exclusive access into shared access without letting a writer in
    pub fn downgrade(self) -> ReadGuard<'a, T> {
        let this = ManuallyDrop::new(self);
        this.lock.wr2rdlock();
        ReadGuard { lock: this.lock }
    }
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the writer is the only holder.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the writer is the only holder.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.wrunlock();
    }
}
