//! Plain spinlock: ticketless mutual exclusion via test-and-swap.
//!
//! No fairness guarantee — under contention, the same thread may win the
//! CAS race repeatedly while others starve. [`crate::ticket::TicketLock`],
//! [`crate::clh::ClhLock`] and the fair RW locks exist precisely because
//! this one doesn't make any ordering promise.

use crate::atomic::wait_until_bool;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A spinning mutual-exclusion lock around a `T`.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is always mediated by the `locked` flag's
// acquire/release protocol, so `SpinLock<T>` may be shared across threads
// whenever `T: Send`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new, unlocked spinlock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, spinning until it is free.
    ///
    /// Never fails: there is no timeout and no poisoning. A panic while
    /// holding the guard simply unwinds with the lock released, the same
    /// as any other RAII guard (unlike `std::sync::Mutex`, this lock is
    /// never "poisoned" — that concept doesn't apply to spin locks, which
    /// have no blocked-waiter wakeup to skip).
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        loop {
            // Fast-path: an uncontended CAS from the observed-free state.
            wait_until_bool(&self.locked, false, Ordering::Relaxed);
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        SpinGuard { lock: self }
    }

    /// Attempts to acquire the lock without spinning.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    /// Returns `true` if the lock is currently held by some thread.
    ///
    /// Racy by nature — useful only for diagnostics, never for correctness
    /// decisions.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// RAII guard returned by [`SpinLock::lock`]; releases on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard means we hold the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard means we hold the lock exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
