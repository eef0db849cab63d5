//! Typed construction errors plus a pluggable fatal-misuse reporter.
//!
//! This crate's primitives never fail on `acquire`, and `release` only
//! "fails" by aborting the process — there is no invariant left to restore
//! once a caller double-releases a lock or frees a non-empty ring. What
//! *can* fail in the ordinary `Result`-returning sense is construction:
//! [`RingBuffer::alloc`](crate::ring::RingBuffer::alloc) rejects a bad
//! element count or an invalid flag combination.
//!
//! Both error classes are additionally routed through a process-wide
//! [`Reporter`] hook, so a caller that centralizes diagnostics (structured
//! logging, a metrics counter, a crash handler) sees every validation
//! failure and every fatal misuse in one place, whether or not it bothers
//! to match on the returned `Result`.

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};
use thiserror::Error;

/// Errors returned by ring-buffer construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufAllocError {
    /// `nelems` was zero or exceeded [`RingBuffer::MAX_ELEMS`](crate::ring::RingBuffer::MAX_ELEMS).
    #[error("invalid element count {nelems} (must be 1..={max})")]
    InvalidCount {
        /// The rejected element count.
        nelems: u32,
        /// The crate's documented upper bound.
        max: u32,
    },
    /// The requested producer/consumer flag combination is mutually
    /// exclusive (e.g. single-producer together with non-blocking-multi
    /// enqueue).
    #[error("invalid or mutually exclusive ring buffer flags: {flags:#x}")]
    InvalidFlags {
        /// The rejected raw flag bits.
        flags: u32,
    },
}

/// A fatal, unrecoverable misuse of a lock or ring buffer.
///
/// Reported once via the process-wide [`Reporter`], then the process
/// aborts. There is deliberately no `Result` path here: these conditions
/// (double release, reader-count overflow, destroying a non-empty ring)
/// indicate memory-safety-adjacent invariants were already violated by the
/// caller before this code ever ran.
#[derive(Debug, Clone, Copy, Error)]
pub enum FatalMisuse {
    /// `release_rd`/`release_wr` called on a lock that was not actually
    /// held in the matching mode.
    #[error("invalid release of lock at {address:#x}")]
    InvalidRelease {
        /// The lock's address, for operator diagnosis.
        address: usize,
    },
    /// A reader/writer lock's 31-bit reader count overflowed.
    #[error("reader count overflow on rwlock at {address:#x}")]
    ReaderOverflow {
        /// The lock's address.
        address: usize,
    },
    /// A ring buffer was dropped while producer and consumer heads still
    /// disagreed (i.e. the ring was not empty).
    #[error("ring buffer at {address:#x} dropped while not empty")]
    RingNotEmpty {
        /// The ring buffer's address.
        address: usize,
    },
}

/// Receives structured reports of validation failures and fatal misuse.
///
/// Implement this to route diagnostics into your own logging/metrics
/// stack. The default [`StderrReporter`] just prints to stderr, matching
/// the behavior of an unconfigured process.
pub trait Reporter: Send + Sync {
    /// `module` names the component reporting (`"ringbuf"`, `"rwlock"`,
    /// ...), `message` is a short human-readable description, and `value`
    /// is the offending value (an element count, a flag word, an address)
    /// for structured log fields.
    fn report(&self, module: &str, message: &str, value: u64);
}

/// The default [`Reporter`]: prints `module: message (value)` to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn report(&self, module: &str, message: &str, value: u64) {
        eprintln!("{module}: {message} ({value:#x})");
    }
}

impl fmt::Debug for dyn Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Reporter")
    }
}

static REPORTER: AtomicPtr<Box<dyn Reporter>> = AtomicPtr::new(std::ptr::null_mut());

/// Installs a process-wide [`Reporter`], replacing (and leaking) any
/// previous one. Intended to be called once, early in `main`.
pub fn set_reporter<R: Reporter + 'static>(reporter: R) {
    let boxed: Box<Box<dyn Reporter>> = Box::new(Box::new(reporter));
    let prev = REPORTER.swap(Box::into_raw(boxed), Ordering::AcqRel);
    if !prev.is_null() {
        // Leak intentionally: a reporter may still be mid-call on another
        // thread. Reporters are meant to be installed once at startup, not
        // churned at runtime.
        std::mem::forget(unsafe { Box::from_raw(prev) });
    }
}

fn report(module: &str, message: &str, value: u64) {
    let ptr = REPORTER.load(Ordering::Acquire);
    if ptr.is_null() {
        StderrReporter.report(module, message, value);
    } else {
        // SAFETY: once installed, a reporter is never freed (see
        // `set_reporter`'s deliberate leak), so this pointer stays valid
        // for the process lifetime.
        let reporter: &dyn Reporter = unsafe { &**ptr };
        reporter.report(module, message, value);
    }
}

/// Reports a constructor-validation failure and returns it.
pub(crate) fn report_alloc_error(module: &str, err: RingBufAllocError) -> RingBufAllocError {
    let value = match err {
        RingBufAllocError::InvalidCount { nelems, .. } => u64::from(nelems),
        RingBufAllocError::InvalidFlags { flags } => u64::from(flags),
    };
    report(module, &err.to_string(), value);
    err
}

/// Reports a fatal misuse and aborts the process. Never returns.
pub(crate) fn fatal(module: &str, err: FatalMisuse) -> ! {
    let value = match err {
        FatalMisuse::InvalidRelease { address }
        | FatalMisuse::ReaderOverflow { address }
        | FatalMisuse::RingNotEmpty { address } => address as u64,
    };
    report(module, &err.to_string(), value);
    std::process::abort();
}
