//! Two-phase acquire/release handles: [`Reservation`] for enqueue,
//! [`Consumption`] for dequeue.
//!
//! Both borrow the slab of slots and the peer endpoint whose `released`
//! word their `commit`/`finish` eventually updates. Dropping either without
//! committing is a logic error (a claimed range that's never handed back
//! wedges the ring for the peer side forever) and is caught in debug builds.

use super::endpoint::{cur_of, pend_of, PENDMAX};
use crate::invariants::{debug_assert_pending_disjoint, debug_assert_pending_in_window};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseKind {
    Single,
    Blocking,
    NonBlocking,
}

/// Waits for `loc`'s in-order cursor to reach `idx`, then stores
/// `idx + n` (pend always 0 — only `NonBlocking` ever sets pend bits).
/// `loads_only` is true for a consumer release (it only read the slots;
/// a `LoadStore` fence suffices) and false for a producer release (it
/// wrote the slots and needs a full release store to publish them).
pub(crate) fn release_blocking(loc: &AtomicU64, idx: u32, n: u32, loads_only: bool) {
    // Under `Blocking` discipline `pend` is always 0, so waiting for the
    // whole packed word to equal `{idx, 0}` is equivalent to waiting for
    // just the `cur` half to reach `idx`.
    crate::atomic::wait_until_u64_equal(loc, pack(idx, 0), Ordering::Relaxed);
    store_released(loc, idx.wrapping_add(n), loads_only);
}

/// No wait: the caller is the only thread that ever releases into `loc`,
/// so it is always already "our turn".
pub(crate) fn release_single(loc: &AtomicU64, idx: u32, n: u32, loads_only: bool) {
    store_released(loc, idx.wrapping_add(n), loads_only);
}

fn store_released(loc: &AtomicU64, new_cur: u32, loads_only: bool) {
    if loads_only {
        fence(Ordering::Release);
        loc.store(pack(new_cur, 0), Ordering::Relaxed);
    } else {
        loc.store(pack(new_cur, 0), Ordering::Release);
    }
}

#[inline]
const fn pack(cur: u32, pend: u32) -> u64 {
    super::endpoint::pack(cur, pend)
}

/// Out-of-order-tolerant release: first tries a direct in-order CAS
/// (`{idx,0} -> {idx+n,0}`); if that keeps losing to a releaser who's
/// still behind us, folds our range into the pending bitmap instead of
/// blocking, promoting the in-order cursor past however many contiguous
/// pending bits now follow it.
pub(crate) fn release_nonblocking(loc: &AtomicU64, idx: u32, n: u32) {
    // A release wider than PENDMAX can still complete through the fast
    // path above (an uncontended direct CAS has no width limit); it's only
    // the pending-bitmap fallback below that requires n to fit.
    let observed = loop {
        let old = pack(idx, 0);
        let neu = pack(idx.wrapping_add(n), 0);
        match loc.compare_exchange_weak(old, neu, Ordering::Release, Ordering::Relaxed) {
            Ok(_) => return,
            Err(cur) => {
                let delta = idx.wrapping_add(n).wrapping_sub(cur_of(cur));
                if delta <= PENDMAX {
                    break cur;
                }
                std::hint::spin_loop();
            }
        }
    };

    let mut old = observed;
    loop {
        let cur = cur_of(old);
        let offset = idx.wrapping_sub(cur);
        debug_assert_pending_in_window!(offset, n, PENDMAX);
        let our_pend: u64 = ((1u64 << n) - 1) << offset;
        let existing_pend = u64::from(pend_of(old));
        debug_assert_pending_disjoint!(existing_pend, our_pend);
        let new_pend = existing_pend | our_pend;
        let inorder = (!new_pend).trailing_zeros().min(32);
        let neu_cur = cur.wrapping_add(inorder);
        let neu_pend = (new_pend >> inorder) as u32;
        let neu = pack(neu_cur, neu_pend);
        match loc.compare_exchange_weak(old, neu, Ordering::Release, Ordering::Relaxed) {
            Ok(_) => return,
            Err(cur2) => old = cur2,
        }
    }
}

/// A claimed, not-yet-published range of `actual` slots starting at
/// `index` (mod `mask + 1`), ready to be written and then [`commit`](Self::commit)ted.
pub struct Reservation<'a, T> {
    slots: &'a [UnsafeCell<MaybeUninit<T>>],
    release_loc: &'a AtomicU64,
    index: u32,
    actual: u32,
    mask: u32,
    kind: ReleaseKind,
    committed: bool,
}

impl<'a, T> Reservation<'a, T> {
    pub(crate) fn new(
        slots: &'a [UnsafeCell<MaybeUninit<T>>],
        release_loc: &'a AtomicU64,
        index: u32,
        actual: u32,
        mask: u32,
        kind: ReleaseKind,
    ) -> Self {
        Self {
            slots,
            release_loc,
            index,
            actual,
            mask,
            kind,
            committed: false,
        }
    }

    /// Number of slots actually claimed; may be less than requested, and is
    /// zero if the ring had no room at all.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actual as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actual == 0
    }

    fn slot(&self, k: usize) -> &UnsafeCell<MaybeUninit<T>> {
        assert!(k < self.actual as usize, "reservation index out of range");
        let idx = (self.index.wrapping_add(k as u32) & self.mask) as usize;
        &self.slots[idx]
    }

    /// Writes `value` into logical slot `k` (`0..len()`), overwriting
    /// whatever uninitialized bytes were there.
    pub fn set(&mut self, k: usize, value: T) {
        let cell = self.slot(k);
        // SAFETY: slot `k` falls within our claimed, peer-disjoint range;
        // no one else reads or writes it until we `commit`.
        unsafe {
            (*cell.get()).write(value);
        }
    }

    /// Publishes the range, making it visible to the peer side. The final
    /// atomic release (or CAS, for `NonBlocking`) orders every preceding
    /// `set` before it becomes observable, so no per-element ordering is
    /// needed beyond plain writes.
    pub fn commit(mut self) {
        self.committed = true;
        if self.actual == 0 {
            return;
        }
        match self.kind {
            ReleaseKind::Single => {
                release_single(self.release_loc, self.index, self.actual, false);
            }
            ReleaseKind::Blocking => {
                release_blocking(self.release_loc, self.index, self.actual, false);
            }
            ReleaseKind::NonBlocking => {
                release_nonblocking(self.release_loc, self.index, self.actual);
            }
        }
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        crate::invariants::debug_assert_released_before_drop!(
            self.committed,
            self.actual,
            "Reservation"
        );
    }
}

/// A claimed range of `actual` already-published slots, ready to be read
/// and then [`finish`](Self::finish)ed to free them back to the producer.
pub struct Consumption<'a, T> {
    slots: &'a [UnsafeCell<MaybeUninit<T>>],
    release_loc: &'a AtomicU64,
    index: u32,
    actual: u32,
    mask: u32,
    kind: ReleaseKind,
    finished: bool,
}

impl<'a, T> Consumption<'a, T> {
    pub(crate) fn new(
        slots: &'a [UnsafeCell<MaybeUninit<T>>],
        release_loc: &'a AtomicU64,
        index: u32,
        actual: u32,
        mask: u32,
        kind: ReleaseKind,
    ) -> Self {
        Self {
            slots,
            release_loc,
            index,
            actual,
            mask,
            kind,
            finished: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actual as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actual == 0
    }

    fn slot(&self, k: usize) -> &UnsafeCell<MaybeUninit<T>> {
        assert!(k < self.actual as usize, "consumption index out of range");
        let idx = (self.index.wrapping_add(k as u32) & self.mask) as usize;
        &self.slots[idx]
    }

    /// Borrows logical slot `k` (`0..len()`) without moving it out.
    #[must_use]
    pub fn get(&self, k: usize) -> &T {
        let cell = self.slot(k);
        // SAFETY: slot `k` was published by the producer before we
        // acquired this range and is not written again until `finish`.
        unsafe { (*cell.get()).assume_init_ref() }
    }

    /// Moves logical slot `k` (`0..len()`) out, leaving its bit pattern
    /// behind uninitialized as far as the type system is concerned (a
    /// future producer will overwrite it before anyone reads it again).
    pub fn take(&mut self, k: usize) -> T {
        let cell = self.slot(k);
        // SAFETY: same as `get`, and each `k` is taken at most once by
        // construction (callers drive `k` themselves).
        unsafe { (*cell.get()).assume_init_read() }
    }

    /// Frees the range back to the producer. Uses `loads_only = true`
    /// release semantics: we only read these slots, so a `LoadStore`
    /// fence ahead of the store suffices instead of a full release.
    pub fn finish(mut self) {
        self.finished = true;
        if self.actual == 0 {
            return;
        }
        match self.kind {
            ReleaseKind::Single => {
                release_single(self.release_loc, self.index, self.actual, true);
            }
            ReleaseKind::Blocking => {
                release_blocking(self.release_loc, self.index, self.actual, true);
            }
            ReleaseKind::NonBlocking => {
                release_nonblocking(self.release_loc, self.index, self.actual);
            }
        }
    }
}

impl<T> Drop for Consumption<'_, T> {
    fn drop(&mut self) {
        crate::invariants::debug_assert_released_before_drop!(
            self.finished,
            self.actual,
            "Consumption"
        );
    }
}
