//! Writer-priority-free reader/writer lock: a single count-and-flag word.
//!
//! The high bit of a 32-bit word is the writer flag; the low 31 bits count
//! active readers. This lock makes no fairness promise between the two
//! classes — under sustained contention, writers can starve behind a
//! continuous stream of readers. [`crate::tfrwlock::TfRwLock`] and
//! [`crate::pfrwlock::PfRwLock`] exist specifically to bound that.

use crate::atomic::{wait_until_u32_clear, wait_until_u32_equal};
use crate::error::{fatal, FatalMisuse};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

const WRITER_BIT: u32 = 1 << 31;
const READER_MASK: u32 = !WRITER_BIT;

/// A reader/writer lock around a `T`, backed by one `AtomicU32`.
pub struct RwLock<T> {
    word: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new, unlocked lock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            word: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock for shared (read) access.
    ///
    /// Aborts the process if the 31-bit reader count would overflow — that
    /// can only happen if some caller elsewhere is leaking read guards, a
    /// bug this lock cannot recover from by returning an error.
    pub fn read(&self) -> RwReadGuard<'_, T> {
        loop {
            wait_until_u32_clear(&self.word, WRITER_BIT, Ordering::Relaxed);
            let l = self.word.load(Ordering::Relaxed);
            if l & READER_MASK == READER_MASK {
                fatal(
                    "rwlock",
                    FatalMisuse::ReaderOverflow {
                        address: self as *const _ as usize,
                    },
                );
            }
            if self
                .word
                .compare_exchange_weak(l, l + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        RwReadGuard { lock: self }
    }

    /// Acquires the lock for exclusive (write) access.
    pub fn write(&self) -> RwWriteGuard<'_, T> {
        loop {
            wait_until_u32_clear(&self.word, WRITER_BIT, Ordering::Relaxed);
            let l = self.word.load(Ordering::Relaxed);
            if self
                .word
                .compare_exchange_weak(l, l | WRITER_BIT, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        // Wait for any readers that entered before our writer flag landed.
        wait_until_u32_equal(&self.word, WRITER_BIT, Ordering::Relaxed);
        RwWriteGuard { lock: self }
    }

    fn release_rd(&self) {
        // Load-store fence: readers never write through the data pointer,
        // so only a LoadStore barrier is needed before the count drops,
        // matching the original `smp_fence(LoadStore)` ahead of the
        // unordered decrement.
        std::sync::atomic::fence(Ordering::Release);
        let prev = self.word.fetch_sub(1, Ordering::Relaxed);
        if prev & WRITER_BIT != 0 || prev == 0 {
            fatal(
                "rwlock",
                FatalMisuse::InvalidRelease {
                    address: self as *const _ as usize,
                },
            );
        }
    }

    fn release_wr(&self) {
        if self.word.load(Ordering::Relaxed) != WRITER_BIT {
            fatal(
                "rwlock",
                FatalMisuse::InvalidRelease {
                    address: self as *const _ as usize,
                },
            );
        }
        self.word.store(0, Ordering::Release);
    }
}

/// RAII guard for shared access, returned by [`RwLock::read`].
pub struct RwReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_rd();
    }
}

/// RAII guard for exclusive access, returned by [`RwLock::write`].
pub struct RwWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_wr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_excludes_everyone() {
        let lock = RwLock::new(0u32);
        let w = lock.write();
        assert_eq!(*w, 0);
        drop(w);
        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(*r1, 0);
        assert_eq!(*r2, 0);
    }

    #[test]
    fn concurrent_readers_and_writers_never_overlap() {
        let lock = Arc::new(RwLock::new(0u64));
        let writer_active = Arc::new(AtomicUsize::new(0));
        let reader_active = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for i in 0..8 {
            let lock = Arc::clone(&lock);
            let writer_active = Arc::clone(&writer_active);
            let reader_active = Arc::clone(&reader_active);
            let violations = Arc::clone(&violations);
            handles.push(thread::spawn(move || {
                for _ in 0..2_000 {
                    if i % 2 == 0 {
                        let mut g = lock.write();
                        let w = writer_active.fetch_add(1, Ordering::SeqCst);
                        let r = reader_active.load(Ordering::SeqCst);
                        if w != 0 || r != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        *g += 1;
                        writer_active.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let g = lock.read();
                        reader_active.fetch_add(1, Ordering::SeqCst);
                        if writer_active.load(Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        let _ = *g;
                        reader_active.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }
}
