//! Shared spin-wait primitives built on top of [`Backoff`].
//!
//! Every lock in this crate (and the ring buffer's blocking release path)
//! needs the same shape of loop: "spin on this atomic word until it reaches
//! some expected state, backing off progressively so we don't hammer the
//! cache-coherency fabric." Centralizing it here means the memory-ordering
//! argument only has to be made once.

use crate::Backoff;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Spins until `word.load(order) == expected`, returning the observed value.
///
/// Uses an adaptive backoff (spin → yield) instead of a bare `loop {}` so a
/// waiter doesn't starve the releasing thread of cache bandwidth under heavy
/// contention. The spin itself never gives up — callers that need bounded
/// waiting build that on top, they don't get it from this primitive (see
/// the crate's "acquire never fails" policy).
#[inline]
pub(crate) fn wait_until_u32_equal(word: &AtomicU32, expected: u32, order: Ordering) -> u32 {
    let mut backoff = Backoff::new();
    loop {
        let v = word.load(order);
        if v == expected {
            return v;
        }
        backoff.snooze();
    }
}

/// Spins until `word.load(order) & mask == 0`.
#[inline]
pub(crate) fn wait_until_u32_clear(word: &AtomicU32, mask: u32, order: Ordering) -> u32 {
    let mut backoff = Backoff::new();
    loop {
        let v = word.load(order);
        if v & mask == 0 {
            return v;
        }
        backoff.snooze();
    }
}

/// Spins until `word.load(order) == expected`, for 64-bit packed words
/// (phase-fair RW lock, ring-buffer idxpair).
#[inline]
pub(crate) fn wait_until_u64_equal(word: &AtomicU64, expected: u64, order: Ordering) -> u64 {
    let mut backoff = Backoff::new();
    loop {
        let v = word.load(order);
        if v == expected {
            return v;
        }
        backoff.snooze();
    }
}

/// Spins until `flag.load(order) == expected`.
#[inline]
pub(crate) fn wait_until_bool(flag: &AtomicBool, expected: bool, order: Ordering) -> bool {
    let mut backoff = Backoff::new();
    loop {
        let v = flag.load(order);
        if v == expected {
            return v;
        }
        backoff.snooze();
    }
}
