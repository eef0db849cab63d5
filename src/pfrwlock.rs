//! Phase-fair reader/writer lock: reader phases and a single writer
//! alternate, and a writer waits behind at most one reader batch no
//! matter how fast readers keep arriving.
//!
//! This is the well-known "pflock" design (as implemented in, e.g.,
//! Concurrency Kit's `ck_pflock`): four independent counters rather than
//! one lock word, with a couple of status bits riding along in the low
//! end of the reader counters instead of a separate field.

use crate::atomic::wait_until_u64_equal;
use crate::Backoff;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

const PHID: u64 = 0x1;
const PRES: u64 = 0x2;
const WBITS: u64 = PHID | PRES;
const RINC: u64 = 0x4;

/// A reader/writer lock around a `T` with bounded writer waiting.
pub struct PfRwLock<T> {
    rin: AtomicU64,
    rout: AtomicU64,
    win: AtomicU64,
    wout: AtomicU64,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for PfRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for PfRwLock<T> {}

impl<T> PfRwLock<T> {
    /// Creates a new, unlocked lock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            rin: AtomicU64::new(0),
            rout: AtomicU64::new(0),
            win: AtomicU64::new(0),
            wout: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock for shared (read) access.
    pub fn read(&self) -> PfReadGuard<'_, T> {
        let w = self.rin.fetch_add(RINC, Ordering::Acquire) & WBITS;
        if w != 0 {
            let mut backoff = Backoff::new();
            while self.rin.load(Ordering::Acquire) & WBITS == w {
                backoff.snooze();
            }
        }
        PfReadGuard { lock: self }
    }

    /// Acquires the lock for exclusive (write) access.
    pub fn write(&self) -> PfWriteGuard<'_, T> {
        let my_ticket = self.win.fetch_add(1, Ordering::Relaxed);
        wait_until_u64_equal(&self.wout, my_ticket, Ordering::Acquire);

        let old_rin = self
            .rin
            .fetch_add(PRES | (my_ticket & PHID), Ordering::Acquire);
        // `old_rin` is `rin` as it stood the instant before our own
        // `PRES`/`PHID` contribution landed, so it already carries every
        // reader that arrived ahead of us (in the `RINC` bits) plus the
        // current phase bit — and, since no other writer can be present
        // here (we just won the `win`/`wout` ticket), its `PRES` bit is
        // always clear already. Readers drain by advancing `rout` via
        // `RINC` until it catches up to exactly this value.
        let target = old_rin & !PRES;

        wait_until_u64_equal(&self.rout, target, Ordering::Acquire);
        PfWriteGuard { lock: self }
    }

    fn release_rd(&self) {
        self.rout.fetch_add(RINC, Ordering::Release);
    }

    fn release_wr(&self) {
        self.rin.fetch_and(!PRES, Ordering::Relaxed);
        self.rin.fetch_xor(PHID, Ordering::Release);
        self.wout.fetch_add(1, Ordering::Release);
    }
}

/// RAII guard for shared access, returned by [`PfRwLock::read`].
pub struct PfReadGuard<'a, T> {
    lock: &'a PfRwLock<T>,
}

impl<T> Deref for PfReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for PfReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_rd();
    }
}

/// RAII guard for exclusive access, returned by [`PfRwLock::write`].
pub struct PfWriteGuard<'a, T> {
    lock: &'a PfRwLock<T>,
}

impl<T> Deref for PfWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for PfWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for PfWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_wr();
    }
}
