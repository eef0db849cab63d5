//! A bounded, power-of-two-sized ring buffer with independently selectable
//! producer and consumer disciplines.
//!
//! Ported from ARM's `p64_ringbuf` (see `p64_ringbuf_alloc`/`_enqueue`/
//! `_dequeue` in the upstream C), generalized from a fixed `void *` payload
//! to an arbitrary `T` and from runtime flag checks to compile-time marker
//! types (see [`mode`]). Six disciplines fall out of the producer/consumer
//! cross product:
//!
//! | | [`Single`] consumer | [`Blocking`] consumer | [`NonBlocking`] consumer | [`LockFree`] consumer |
//! |---|---|---|---|---|
//! | [`Single`] producer | SPSC | — | — | — |
//! | [`Blocking`] producer | — | MPMC, FIFO release both sides | MPMC, in-order enqueue / out-of-order dequeue release | MPMC, dequeue fused into one CAS |
//! | [`NonBlocking`] producer | — | MPMC, out-of-order enqueue release | MPMC, out-of-order both sides | MPMC |
//!
//! (Any producer paired with [`Single`] consumer, and vice versa, requires
//! the matching side to really be accessed by one thread only — see
//! [`mode::Single`]'s docs.)

mod endpoint;
mod flags;
pub mod mode;
mod reservation;

pub use flags::{AnyRingBuffer, RingBufFlags};
pub use mode::{Blocking, ConsMode, LockFree, NonBlocking, ProdMode, Single};
pub use reservation::{Consumption, Reservation};

use crate::error::{fatal, report_alloc_error, FatalMisuse, RingBufAllocError};
use crossbeam_utils::CachePadded;
use endpoint::{bounded_available, cur_of, pack, Endpoint, PENDMAX};
use mode::{ConsDiscipline, ProdDiscipline};
use reservation::{release_nonblocking, ReleaseKind};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

/// A bounded ring of `T`, generic over its producer discipline `P` and
/// consumer discipline `C`.
///
/// Allocated once via [`RingBuffer::alloc`] (or the runtime-dispatching
/// [`AnyRingBuffer::from_flags`]); producers and consumers are obtained via
/// [`RingBuffer::producer`] / [`RingBuffer::consumer`] and may be shared
/// across threads exactly when their discipline allows it (enforced through
/// `Send`/`Sync` on the [`Producer`]/[`Consumer`] handle types, not on
/// `RingBuffer` itself, which is always `Send + Sync`).
pub struct RingBuffer<T, P, C> {
    prod: CachePadded<Endpoint>,
    cons: CachePadded<Endpoint>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    _marker: PhantomData<(P, C)>,
}

unsafe impl<T: Send, P, C> Send for RingBuffer<T, P, C> {}
unsafe impl<T: Send, P, C> Sync for RingBuffer<T, P, C> {}

impl<T, P: ProdMode, C: ConsMode> RingBuffer<T, P, C> {
    /// Upper bound on `nelems`, matching the original's 31-bit index space
    /// (the 32nd bit distinguishes "empty" from "full" across a wraparound).
    pub const MAX_ELEMS: u32 = 1 << 31;

    /// Allocates a ring sized to hold at least `nelems` elements (rounded up
    /// internally to the next power of two for mask-based indexing).
    ///
    /// # Errors
    ///
    /// Returns [`RingBufAllocError::InvalidCount`] if `nelems` is zero or
    /// exceeds [`Self::MAX_ELEMS`].
    pub fn alloc(nelems: u32) -> Result<Self, RingBufAllocError> {
        if nelems == 0 || nelems > Self::MAX_ELEMS {
            return Err(report_alloc_error(
                "ringbuf",
                RingBufAllocError::InvalidCount {
                    nelems,
                    max: Self::MAX_ELEMS,
                },
            ));
        }
        let ringsz = nelems.next_power_of_two();
        let mask = ringsz - 1;
        let slots = (0..ringsz)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            prod: CachePadded::new(Endpoint::new(nelems, mask)),
            cons: CachePadded::new(Endpoint::new(nelems, mask)),
            slots,
            _marker: PhantomData,
        })
    }

    /// The element count passed to [`Self::alloc`] (not the rounded-up
    /// internal slot count).
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.prod.capacity
    }

    /// Number of elements currently enqueued. Racy under concurrent
    /// producers/consumers — meant for metrics, not synchronization.
    #[must_use]
    pub fn len(&self) -> u32 {
        let produced = cur_of(self.cons.released.load(Ordering::Relaxed));
        let consumed = cur_of(self.prod.released.load(Ordering::Relaxed));
        produced.wrapping_sub(consumed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Obtains a handle for enqueuing, valid for as long as `&self` is
    /// borrowed.
    pub fn producer(&self) -> Producer<'_, T, P> {
        Producer {
            prod: &self.prod,
            cons: &self.cons,
            slots: &self.slots,
            _marker: PhantomData,
        }
    }

    /// Obtains a handle for dequeuing, valid for as long as `&self` is
    /// borrowed.
    pub fn consumer(&self) -> Consumer<'_, T, C> {
        Consumer {
            prod: &self.prod,
            cons: &self.cons,
            slots: &self.slots,
            _marker: PhantomData,
        }
    }
}

impl<T, P, C> Drop for RingBuffer<T, P, C> {
    fn drop(&mut self) {
        let produced = cur_of(*self.cons.released.get_mut());
        let consumed = cur_of(*self.prod.released.get_mut());
        if produced != consumed {
            fatal(
                "ringbuf",
                FatalMisuse::RingNotEmpty {
                    address: self as *mut Self as usize,
                },
            );
        }
        let mask = self.prod.mask;
        let mut idx = consumed;
        while idx != produced {
            let slot = &mut self.slots[(idx & mask) as usize];
            // SAFETY: every index in `[consumed, produced)` was published
            // by a producer and never moved out by a consumer (otherwise
            // `produced == consumed` above would not hold for it).
            unsafe {
                slot.get_mut().assume_init_drop();
            }
            idx = idx.wrapping_add(1);
        }
    }
}

/// A handle for enqueuing into a [`RingBuffer`] under discipline `P`.
///
/// `P = `[`Single`] yields a handle that is neither [`Send`] nor [`Sync`]:
/// the type system enforces "exactly one thread, never shared" the same way
/// the original library's callers were simply trusted to. `P =`
/// [`Blocking`]/[`NonBlocking`] handles are both, since any number of
/// threads may hold and use them concurrently.
pub struct Producer<'a, T, P> {
    prod: &'a CachePadded<Endpoint>,
    cons: &'a CachePadded<Endpoint>,
    slots: &'a [UnsafeCell<MaybeUninit<T>>],
    _marker: PhantomData<(P, *const ())>,
}

unsafe impl<'a, T: Send> Send for Producer<'a, T, Single> {}
unsafe impl<'a, T: Send> Send for Producer<'a, T, Blocking> {}
unsafe impl<'a, T: Send> Sync for Producer<'a, T, Blocking> {}
unsafe impl<'a, T: Send> Send for Producer<'a, T, NonBlocking> {}
unsafe impl<'a, T: Send> Sync for Producer<'a, T, NonBlocking> {}

impl<'a, T, P: ProdMode> Producer<'a, T, P> {
    /// Claims up to `n` slots to write into. The returned [`Reservation`]
    /// may hold fewer than `n` (even zero, if the ring is full); callers
    /// that need exactly `n` retry.
    #[must_use]
    pub fn acquire(&self, n: u32) -> Reservation<'a, T> {
        let (index, actual) = match P::DISCIPLINE {
            ProdDiscipline::Single => self.acquire_single(n),
            ProdDiscipline::Blocking | ProdDiscipline::NonBlocking => self.acquire_multi(n),
        };
        let kind = match P::DISCIPLINE {
            ProdDiscipline::Single => ReleaseKind::Single,
            ProdDiscipline::Blocking => ReleaseKind::Blocking,
            ProdDiscipline::NonBlocking => ReleaseKind::NonBlocking,
        };
        Reservation::new(self.slots, &self.cons.released, index, actual, self.prod.mask, kind)
    }

    fn acquire_single(&self, n: u32) -> (u32, u32) {
        let tail = self.prod.reserved.load(Ordering::Relaxed);
        let head = cur_of(self.cons.released.load(Ordering::Acquire));
        let actual = bounded_available(n, self.prod.capacity, head, tail);
        if actual > 0 {
            self.prod.reserved.store(tail.wrapping_add(actual), Ordering::Relaxed);
        }
        (tail, actual)
    }

    fn acquire_multi(&self, n: u32) -> (u32, u32) {
        let mut tail = self.prod.reserved.load(Ordering::Relaxed);
        loop {
            let head = cur_of(self.cons.released.load(Ordering::Acquire));
            let actual = bounded_available(n, self.prod.capacity, head, tail);
            if actual == 0 {
                return (tail, 0);
            }
            match self.prod.reserved.compare_exchange_weak(
                tail,
                tail.wrapping_add(actual),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (tail, actual),
                Err(cur) => tail = cur,
            }
        }
    }

    /// Enqueues a single item, returning it back if the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut r = self.acquire(1);
        if r.is_empty() {
            return Err(value);
        }
        r.set(0, value);
        r.commit();
        Ok(())
    }
}

impl<'a, T: Copy> Producer<'a, T, Single> {
    /// Enqueues as much of `items` as there is room for, copying
    /// (`T: Copy`) across the wraparound boundary in at most two segments.
    /// Returns the number actually enqueued.
    pub fn enqueue(&self, items: &[T]) -> usize {
        enqueue_copy(self, items)
    }
}
impl<'a, T: Copy> Producer<'a, T, Blocking> {
    /// See [`Producer::<T, Single>::enqueue`].
    pub fn enqueue(&self, items: &[T]) -> usize {
        enqueue_copy(self, items)
    }
}
impl<'a, T: Copy> Producer<'a, T, NonBlocking> {
    /// See [`Producer::<T, Single>::enqueue`].
    pub fn enqueue(&self, items: &[T]) -> usize {
        enqueue_copy(self, items)
    }
}

fn enqueue_copy<T: Copy, P: ProdMode>(p: &Producer<'_, T, P>, items: &[T]) -> usize {
    if items.is_empty() {
        return 0;
    }
    let n = u32::try_from(items.len()).unwrap_or(u32::MAX);
    let mut r = p.acquire(n);
    let actual = r.len();
    for (k, &item) in items.iter().take(actual).enumerate() {
        r.set(k, item);
    }
    r.commit();
    actual
}

/// A handle for dequeuing from a [`RingBuffer`] under discipline `C`.
///
/// See [`Producer`] for the `Send`/`Sync` rationale; the same applies here
/// with `C =` [`Single`] giving a handle usable from exactly one thread and
/// `C =` [`Blocking`]/[`NonBlocking`]/[`LockFree`] giving one safe to share.
pub struct Consumer<'a, T, C> {
    prod: &'a CachePadded<Endpoint>,
    cons: &'a CachePadded<Endpoint>,
    slots: &'a [UnsafeCell<MaybeUninit<T>>],
    _marker: PhantomData<(C, *const ())>,
}

unsafe impl<'a, T: Send> Send for Consumer<'a, T, Single> {}
unsafe impl<'a, T: Send> Send for Consumer<'a, T, Blocking> {}
unsafe impl<'a, T: Send> Sync for Consumer<'a, T, Blocking> {}
unsafe impl<'a, T: Send> Send for Consumer<'a, T, NonBlocking> {}
unsafe impl<'a, T: Send> Sync for Consumer<'a, T, NonBlocking> {}
unsafe impl<'a, T: Send> Send for Consumer<'a, T, LockFree> {}
unsafe impl<'a, T: Send> Sync for Consumer<'a, T, LockFree> {}

impl<'a, T, C: ConsMode> Consumer<'a, T, C> {
    /// Claims up to `n` published slots to read. Not available under
    /// [`LockFree`] (see [`Consumer::dequeue_into`] instead), since a
    /// lock-free dequeue fuses acquire and release into a single CAS and
    /// has no separate claimed-but-unread state to hand back.
    #[must_use]
    pub fn acquire(&self, n: u32) -> Consumption<'a, T>
    where
        C: NotLockFree,
    {
        let (index, actual) = match C::DISCIPLINE {
            ConsDiscipline::Single => self.acquire_single(n),
            ConsDiscipline::Blocking | ConsDiscipline::NonBlocking => self.acquire_multi(n),
            ConsDiscipline::LockFree => unreachable!("excluded by NotLockFree bound"),
        };
        let kind = match C::DISCIPLINE {
            ConsDiscipline::Single => ReleaseKind::Single,
            ConsDiscipline::Blocking => ReleaseKind::Blocking,
            ConsDiscipline::NonBlocking => ReleaseKind::NonBlocking,
            ConsDiscipline::LockFree => unreachable!("excluded by NotLockFree bound"),
        };
        Consumption::new(self.slots, &self.prod.released, index, actual, self.cons.mask, kind)
    }

    fn acquire_single(&self, n: u32) -> (u32, u32) {
        let tail = self.cons.reserved.load(Ordering::Relaxed);
        let head = cur_of(self.prod.released.load(Ordering::Acquire));
        let actual = bounded_available(n, 0, head, tail);
        if actual > 0 {
            self.cons.reserved.store(tail.wrapping_add(actual), Ordering::Relaxed);
        }
        (tail, actual)
    }

    fn acquire_multi(&self, n: u32) -> (u32, u32) {
        let mut tail = self.cons.reserved.load(Ordering::Relaxed);
        loop {
            let head = cur_of(self.prod.released.load(Ordering::Acquire));
            let actual = bounded_available(n, 0, head, tail);
            if actual == 0 {
                return (tail, 0);
            }
            match self.cons.reserved.compare_exchange_weak(
                tail,
                tail.wrapping_add(actual),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (tail, actual),
                Err(cur) => tail = cur,
            }
        }
    }

    /// Dequeues a single item, or `None` if the ring is empty.
    pub fn pop(&self) -> Option<T>
    where
        C: NotLockFree,
    {
        let mut c = self.acquire(1);
        if c.is_empty() {
            return None;
        }
        let value = c.take(0);
        c.finish();
        Some(value)
    }
}

/// Excludes [`LockFree`], whose acquire/release is fused into a single CAS
/// and so doesn't fit the claim-then-release [`Consumption`] shape.
pub trait NotLockFree: ConsMode {}
impl NotLockFree for Single {}
impl NotLockFree for Blocking {}
impl NotLockFree for NonBlocking {}

impl<'a, T: Copy, C: NotLockFree> Consumer<'a, T, C> {
    /// Dequeues as much as `out` has room for, copying (`T: Copy`) across
    /// the wraparound boundary in at most two segments. Returns the number
    /// actually dequeued.
    pub fn dequeue(&self, out: &mut [T]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let n = u32::try_from(out.len()).unwrap_or(u32::MAX);
        let mut c = self.acquire(n);
        let actual = c.len();
        for (k, slot) in out.iter_mut().take(actual).enumerate() {
            *slot = *c.get(k);
        }
        c.finish();
        actual
    }
}

impl<'a, T: Copy> Consumer<'a, T, LockFree> {
    /// Dequeues up to `out.len()` items in one step: acquire and release
    /// are the same CAS here, directly against the producer's completion
    /// cursor, so reads are speculative and may be repeated if a
    /// concurrent dequeuer wins the race for the same range.
    pub fn dequeue_into(&self, out: &mut [T]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let want = u32::try_from(out.len()).unwrap_or(u32::MAX);
        let mut head = self.prod.released.load(Ordering::Relaxed);
        loop {
            let cur = cur_of(head);
            crate::invariants::debug_assert_no_pending_bits!(head);
            let tail = cur_of(self.cons.released.load(Ordering::Acquire));
            let actual = bounded_available(want, 0, tail, cur);
            if actual == 0 {
                return 0;
            }
            for (k, slot) in out.iter_mut().take(actual as usize).enumerate() {
                let idx = (cur.wrapping_add(k as u32) & self.cons.mask) as usize;
                // SAFETY: `[cur, tail)` was published by the producer;
                // reading it non-destructively is safe even if this CAS
                // attempt loses the race and the same range gets re-read.
                *slot = unsafe { (*self.slots[idx].get()).assume_init() };
            }
            let neu = pack(cur.wrapping_add(actual), 0);
            match self.prod.released.compare_exchange_weak(
                head,
                neu,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return actual as usize,
                Err(observed) => head = observed,
            }
        }
    }
}
