//! Task-fair reader/writer lock: readers and writers each draw a ticket
//! from a shared request/completion pair, so a writer can never be
//! overtaken by a reader that queues behind it.
//!
//! Compare with the plain [`crate::rwlock::RwLock`], which makes no
//! fairness promise at all and can starve writers indefinitely under a
//! steady stream of readers.

use crate::Backoff;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

const RD_MASK: u32 = 0x00FF_FFFF;
const WR_SHIFT: u32 = 24;
const RD_INC: u32 = 1;
const WR_INC: u32 = 1 << WR_SHIFT;

#[inline]
fn rd_of(word: u32) -> u32 {
    word & RD_MASK
}

#[inline]
fn wr_of(word: u32) -> u8 {
    (word >> WR_SHIFT) as u8
}

/// A reader/writer lock around a `T` that is fair to both reader and
/// writer arrivals.
pub struct TfRwLock<T> {
    request: AtomicU32,
    completion: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for TfRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for TfRwLock<T> {}

impl<T> TfRwLock<T> {
    /// Creates a new, unlocked lock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            request: AtomicU32::new(0),
            completion: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock for shared (read) access.
    ///
    /// Waits only for writers queued ahead of us; concurrent readers never
    /// wait on each other.
    pub fn read(&self) -> TfReadGuard<'_, T> {
        let my_ticket = self.request.fetch_add(RD_INC, Ordering::Relaxed);
        let my_wr = wr_of(my_ticket);
        let mut backoff = Backoff::new();
        loop {
            if wr_of(self.completion.load(Ordering::Acquire)) == my_wr {
                break;
            }
            backoff.snooze();
        }
        TfReadGuard { lock: self }
    }

    /// Acquires the lock for exclusive (write) access.
    pub fn write(&self) -> TfWriteGuard<'_, T> {
        let snapshot = self.request.fetch_add(WR_INC, Ordering::Relaxed);
        let my_ticket = rd_of(snapshot) | (u32::from(wr_of(snapshot)) << WR_SHIFT);
        let mut backoff = Backoff::new();
        loop {
            if self.completion.load(Ordering::Acquire) == my_ticket {
                break;
            }
            backoff.snooze();
        }
        TfWriteGuard { lock: self }
    }

    fn release_rd(&self) {
        self.completion.fetch_add(RD_INC, Ordering::Release);
    }

    fn release_wr(&self) {
        self.completion.fetch_add(WR_INC, Ordering::Release);
    }
}

/// RAII guard for shared access, returned by [`TfRwLock::read`].
pub struct TfReadGuard<'a, T> {
    lock: &'a TfRwLock<T>,
}

impl<T> Deref for TfReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for TfReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_rd();
    }
}

/// RAII guard for exclusive access, returned by [`TfRwLock::write`].
pub struct TfWriteGuard<'a, T> {
    lock: &'a TfRwLock<T>,
}

impl<T> Deref for TfWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for TfWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for TfWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_wr();
    }
}
