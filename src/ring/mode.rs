//! Marker types selecting a ring buffer's producer/consumer discipline.
//!
//! Generic dispatch on `P: ProdMode` / `C: ConsMode` replaces the flag bits
//! the original C library tests at every call; here the discipline is fixed
//! at the type level, and the compiler picks the right branch (often the
//! *only* branch, once inlined) once per call site instead of once per call.

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Single {}
    impl Sealed for super::Blocking {}
    impl Sealed for super::NonBlocking {}
    impl Sealed for super::LockFree {}
}

/// Discipline tag for the producer side of a [`crate::ring::RingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProdDiscipline {
    Single,
    Blocking,
    NonBlocking,
}

/// Discipline tag for the consumer side of a [`crate::ring::RingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsDiscipline {
    Single,
    Blocking,
    NonBlocking,
    LockFree,
}

/// A type-level producer discipline: [`Single`], [`Blocking`], or
/// [`NonBlocking`].
pub trait ProdMode: sealed::Sealed + 'static {
    #[doc(hidden)]
    const DISCIPLINE: ProdDiscipline;
}

/// A type-level consumer discipline: [`Single`], [`Blocking`],
/// [`NonBlocking`], or [`LockFree`].
pub trait ConsMode: sealed::Sealed + 'static {
    #[doc(hidden)]
    const DISCIPLINE: ConsDiscipline;
}

/// Exactly one thread ever acts on this side; no CAS, no waiting, a plain
/// load-then-store. Callers that violate this (two threads holding a
/// `Producer<'_, T, Single>` or `Consumer<'_, T, Single>` concurrently) see
/// corruption the same way the original C does — this crate only fences
/// that off via `Send`/`Sync` on the handle types, not via the ring itself.
#[derive(Debug)]
pub struct Single;

/// Multiple threads act on this side; acquire is a CAS retry loop, release
/// waits for its predecessor and stores in order.
#[derive(Debug)]
pub struct Blocking;

/// Multiple threads act on this side; acquire is a CAS retry loop same as
/// [`Blocking`], but release never waits — out-of-order completions are
/// tracked in a pending bitmap and folded in as soon as they become
/// contiguous with the in-order cursor.
#[derive(Debug)]
pub struct NonBlocking;

/// Consumer-only: dequeue is a single CAS against the producer's own
/// completion cursor, fusing acquire and release into one step. Requires
/// `T: Copy` since a CAS attempt may be retried after already copying out
/// the slots it speculatively claimed.
#[derive(Debug)]
pub struct LockFree;

impl ProdMode for Single {
    const DISCIPLINE: ProdDiscipline = ProdDiscipline::Single;
}
impl ProdMode for Blocking {
    const DISCIPLINE: ProdDiscipline = ProdDiscipline::Blocking;
}
impl ProdMode for NonBlocking {
    const DISCIPLINE: ProdDiscipline = ProdDiscipline::NonBlocking;
}

impl ConsMode for Single {
    const DISCIPLINE: ConsDiscipline = ConsDiscipline::Single;
}
impl ConsMode for Blocking {
    const DISCIPLINE: ConsDiscipline = ConsDiscipline::Blocking;
}
impl ConsMode for NonBlocking {
    const DISCIPLINE: ConsDiscipline = ConsDiscipline::NonBlocking;
}
impl ConsMode for LockFree {
    const DISCIPLINE: ConsDiscipline = ConsDiscipline::LockFree;
}
