//! Runtime flag combination mirroring the original library's `p64_ringbuf`
//! flags, for callers that pick a discipline at runtime rather than at
//! compile time via [`super::RingBuffer`]'s type parameters.

use super::mode::{Blocking, LockFree, NonBlocking, Single};
use super::RingBuffer;
use crate::error::RingBufAllocError;

/// Producer/consumer discipline flags, combined with `|`.
///
/// Exactly one producer flag (or none, meaning [`Single`]) and exactly one
/// consumer flag (or none, meaning [`Single`]) may be set; anything else is
/// rejected by [`RingBuffer::from_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingBufFlags(u32);

impl RingBufFlags {
    /// Single producer (the default if no producer flag is set).
    pub const SPENQ: Self = Self(1 << 0);
    /// Multiple producers, blocking (in-order) release.
    pub const MPENQ: Self = Self(1 << 1);
    /// Multiple producers, non-blocking (pending-bitmap) release.
    pub const NBENQ: Self = Self(1 << 2);
    /// Single consumer (the default if no consumer flag is set).
    pub const SCDEQ: Self = Self(1 << 3);
    /// Multiple consumers, blocking (in-order) release.
    pub const MCDEQ: Self = Self(1 << 4);
    /// Multiple consumers, non-blocking (pending-bitmap) release.
    pub const NBDEQ: Self = Self(1 << 5);
    /// Multiple consumers, lock-free (single-CAS) dequeue.
    pub const LFDEQ: Self = Self(1 << 6);

    const PROD_BITS: u32 = Self::SPENQ.0 | Self::MPENQ.0 | Self::NBENQ.0;
    const CONS_BITS: u32 = Self::SCDEQ.0 | Self::MCDEQ.0 | Self::NBDEQ.0 | Self::LFDEQ.0;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    fn prod_bits(self) -> u32 {
        self.0 & Self::PROD_BITS
    }

    fn cons_bits(self) -> u32 {
        self.0 & Self::CONS_BITS
    }
}

impl std::ops::BitOr for RingBufFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RingBufFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A runtime-selected ring buffer, dispatching to whichever monomorphized
/// [`RingBuffer`] instantiation matches the requested [`RingBufFlags`].
///
/// Only the operations needed by a flag-driven caller are exposed here
/// (push/pop/len/capacity); callers who want the full two-phase
/// reserve/commit API pick their discipline at compile time and use
/// [`RingBuffer`] directly instead of going through `from_flags`.
pub enum AnyRingBuffer<T> {
    SpScSingle(RingBuffer<T, Single, Single>),
    SpScBlocking(RingBuffer<T, Single, Blocking>),
    SpScNonBlocking(RingBuffer<T, Single, NonBlocking>),
    MpScSingle(RingBuffer<T, Blocking, Single>),
    MpScBlocking(RingBuffer<T, Blocking, Blocking>),
    MpScNonBlocking(RingBuffer<T, Blocking, NonBlocking>),
    NbpScSingle(RingBuffer<T, NonBlocking, Single>),
    NbpScBlocking(RingBuffer<T, NonBlocking, Blocking>),
    NbpScNonBlocking(RingBuffer<T, NonBlocking, NonBlocking>),
}

impl<T> AnyRingBuffer<T> {
    /// Allocates a ring with `nelems` (rounded up to the next power of two)
    /// slots, dispatching on `flags`. Rejects `LFDEQ` (lock-free dequeue
    /// needs `T: Copy` and a caller-provided output buffer, a shape that
    /// doesn't fit this type-erased wrapper's push/pop API) along with any
    /// other invalid or conflicting combination.
    pub fn from_flags(nelems: u32, flags: RingBufFlags) -> Result<Self, RingBufAllocError> {
        let prod = flags.prod_bits();
        let cons = flags.cons_bits();
        if prod.count_ones() > 1 || cons.count_ones() > 1 || cons & RingBufFlags::LFDEQ.0 != 0 {
            return Err(crate::error::report_alloc_error(
                "ringbuf",
                RingBufAllocError::InvalidFlags { flags: flags.bits() },
            ));
        }
        let is_mpenq = prod == RingBufFlags::MPENQ.0;
        let is_nbenq = prod == RingBufFlags::NBENQ.0;
        let is_mcdeq = cons == RingBufFlags::MCDEQ.0;
        let is_nbdeq = cons == RingBufFlags::NBDEQ.0;

        Ok(if !is_mpenq && !is_nbenq {
            if is_mcdeq {
                Self::SpScBlocking(RingBuffer::alloc(nelems)?)
            } else if is_nbdeq {
                Self::SpScNonBlocking(RingBuffer::alloc(nelems)?)
            } else {
                Self::SpScSingle(RingBuffer::alloc(nelems)?)
            }
        } else if is_mpenq {
            if is_mcdeq {
                Self::MpScBlocking(RingBuffer::alloc(nelems)?)
            } else if is_nbdeq {
                Self::MpScNonBlocking(RingBuffer::alloc(nelems)?)
            } else {
                Self::MpScSingle(RingBuffer::alloc(nelems)?)
            }
        } else if is_mcdeq {
            Self::NbpScBlocking(RingBuffer::alloc(nelems)?)
        } else if is_nbdeq {
            Self::NbpScNonBlocking(RingBuffer::alloc(nelems)?)
        } else {
            Self::NbpScSingle(RingBuffer::alloc(nelems)?)
        })
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        match self {
            Self::SpScSingle(r) => r.capacity(),
            Self::SpScBlocking(r) => r.capacity(),
            Self::SpScNonBlocking(r) => r.capacity(),
            Self::MpScSingle(r) => r.capacity(),
            Self::MpScBlocking(r) => r.capacity(),
            Self::MpScNonBlocking(r) => r.capacity(),
            Self::NbpScSingle(r) => r.capacity(),
            Self::NbpScBlocking(r) => r.capacity(),
            Self::NbpScNonBlocking(r) => r.capacity(),
        }
    }

    /// Pushes a single item, returning it back on failure (the ring is
    /// full).
    pub fn push(&self, value: T) -> Result<(), T> {
        match self {
            Self::SpScSingle(r) => r.producer().push(value),
            Self::SpScBlocking(r) => r.producer().push(value),
            Self::SpScNonBlocking(r) => r.producer().push(value),
            Self::MpScSingle(r) => r.producer().push(value),
            Self::MpScBlocking(r) => r.producer().push(value),
            Self::MpScNonBlocking(r) => r.producer().push(value),
            Self::NbpScSingle(r) => r.producer().push(value),
            Self::NbpScBlocking(r) => r.producer().push(value),
            Self::NbpScNonBlocking(r) => r.producer().push(value),
        }
    }

    /// Pops a single item, or `None` if the ring is empty.
    pub fn pop(&self) -> Option<T> {
        match self {
            Self::SpScSingle(r) => r.consumer().pop(),
            Self::SpScBlocking(r) => r.consumer().pop(),
            Self::SpScNonBlocking(r) => r.consumer().pop(),
            Self::MpScSingle(r) => r.consumer().pop(),
            Self::MpScBlocking(r) => r.consumer().pop(),
            Self::MpScNonBlocking(r) => r.consumer().pop(),
            Self::NbpScSingle(r) => r.consumer().pop(),
            Self::NbpScBlocking(r) => r.consumer().pop(),
            Self::NbpScNonBlocking(r) => r.consumer().pop(),
        }
    }
}
