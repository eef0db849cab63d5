//! Spin-based concurrency primitives: six mutual-exclusion/reader-writer
//! lock variants and a multi-mode lock-free ring buffer.
//!
//! All of it assumes short critical sections and a scheduler that won't
//! preempt a lock holder for long — these are building blocks for kernels,
//! runtimes, and latency-sensitive services, not general-purpose
//! replacements for [`std::sync::Mutex`].
//!
//! # Locks
//!
//! - [`SpinLock`] — plain test-and-set mutual exclusion.
//! - [`RwLock`] — reader/writer, no fairness guarantee.
//! - [`TicketLock`] — FIFO mutual exclusion.
//! - [`ClhLock`] — FIFO mutual exclusion, queue-based (scales better than
//!   [`TicketLock`] under heavy contention).
//! - [`TfRwLock`] — task-fair reader/writer: a writer can never be
//!   overtaken by a reader that arrives after it.
//! - [`PfRwLock`] — phase-fair reader/writer: a writer waits behind at most
//!   one batch of already-arrived readers.
//!
//! # Ring buffer
//!
//! [`ring::RingBuffer`] is a bounded SPSC/MPMC ring with the producer and
//! consumer disciplines picked independently, each from
//! {single-threaded, blocking-multi, non-blocking-multi} (plus a
//! lock-free-multi option on the consumer side). See [`ring`] for details.
//!
//! # Errors and diagnostics
//!
//! Construction failures ([`RingBuffer::alloc`](ring::RingBuffer::alloc))
//! return a `Result`; everything else in this crate treats misuse (double
//! release, a ring dropped non-empty, a reader count overflowing) as fatal
//! and aborts after reporting through [`error::Reporter`] — see
//! [`error`] for how to install your own.

mod atomic;
mod backoff;
pub mod clh;
pub mod error;
mod invariants;
pub mod pfrwlock;
pub mod ring;
pub mod rwlock;
pub mod spinlock;
pub mod tfrwlock;
pub mod ticket;

pub(crate) use backoff::Backoff;

pub use clh::{ClhGuard, ClhHandle, ClhLock};
pub use pfrwlock::{PfReadGuard, PfRwLock, PfWriteGuard};
pub use ring::{AnyRingBuffer, ConsMode, ProdMode, RingBufFlags, RingBuffer};
pub use rwlock::{RwLock, RwReadGuard, RwWriteGuard};
pub use spinlock::{SpinGuard, SpinLock};
pub use tfrwlock::{TfReadGuard, TfRwLock, TfWriteGuard};
pub use ticket::{TicketGuard, TicketLock};
