//! Loom-based concurrency tests for the ring buffer's claim/release protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings to find concurrency bugs
//! that only show up under specific scheduling. The real [`syncring::ring`]
//! types are built on `std::sync::atomic`, which loom can't instrument, so
//! these tests model the same packed `(cur, pend)` protocol
//! (`src/ring/endpoint.rs`, `src/ring/reservation.rs`) against loom's atomic
//! types instead.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::cell::UnsafeCell;

const PENDMAX: u32 = 32;

fn pack(cur: u32, pend: u32) -> u64 {
    (u64::from(pend) << 32) | u64::from(cur)
}
fn cur_of(word: u64) -> u32 {
    word as u32
}
fn pend_of(word: u64) -> u32 {
    (word >> 32) as u32
}

/// A minimal two-endpoint ring mirroring `Endpoint`/`Reservation`/
/// `Consumption`: `prod_released` is written by the producer side and read
/// by the consumer, `cons_released` the reverse.
struct LoomRing {
    prod_reserved: AtomicU32,
    prod_released: AtomicU64,
    cons_released: AtomicU64,
    buffer: UnsafeCell<[u64; 4]>,
    mask: u32,
}

unsafe impl Send for LoomRing {}
unsafe impl Sync for LoomRing {}

impl LoomRing {
    fn new() -> Self {
        Self {
            prod_reserved: AtomicU32::new(0),
            prod_released: AtomicU64::new(0),
            cons_released: AtomicU64::new(0),
            buffer: UnsafeCell::new([0; 4]),
            mask: 3,
        }
    }

    /// Single-producer push: claim one slot against `cons_released`
    /// (consumer's completion cursor), write it, then release in order.
    fn push(&self, value: u64) -> bool {
        let tail = self.prod_reserved.load(Ordering::Relaxed);
        let head = cur_of(self.cons_released.load(Ordering::Acquire));
        let used = tail.wrapping_sub(head);
        if used >= 4 {
            return false;
        }
        self.prod_reserved.store(tail.wrapping_add(1), Ordering::Relaxed);

        let idx = (tail & self.mask) as usize;
        // SAFETY: slot `idx` is past every already-released index and
        // before any index reserved by a later call (single producer).
        unsafe {
            (*self.buffer.get())[idx] = value;
        }
        self.prod_released.store(pack(tail.wrapping_add(1), 0), Ordering::Release);
        true
    }

    /// Single-consumer pop, mirroring `Consumer::<Single>::pop`.
    fn pop(&self) -> Option<u64> {
        let head = cur_of(self.prod_released.load(Ordering::Acquire));
        let tail = cur_of(self.cons_released.load(Ordering::Relaxed));
        if tail == head {
            return None;
        }
        let idx = (tail & self.mask) as usize;
        // SAFETY: index `tail` was published by the producer and not yet
        // reclaimed (single consumer).
        let value = unsafe { (*self.buffer.get())[idx] };
        self.cons_released.store(pack(tail.wrapping_add(1), 0), Ordering::Release);
        Some(value)
    }
}

#[test]
fn loom_spsc_basic() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            ring2.push(42);
            ring2.push(43);
        });

        let consumer = thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..10 {
                if let Some(v) = ring.pop() {
                    received.push(v);
                }
                if received.len() == 2 {
                    break;
                }
                loom::thread::yield_now();
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        if received.len() >= 2 {
            assert_eq!(received[0], 42);
            assert_eq!(received[1], 43);
        }
    });
}

#[test]
fn loom_spsc_full_ring_then_drains() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert!(ring.push(4));
        assert!(!ring.push(5));

        let consumer = thread::spawn(move || ring2.pop());

        let value = consumer.join().unwrap();
        assert_eq!(value, Some(1));
        assert!(ring.push(5));
    });
}

#[test]
fn loom_spsc_concurrent_never_overreceives() {
    use loom::sync::atomic::AtomicUsize;

    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring_p = Arc::clone(&ring);
        let ring_c = Arc::clone(&ring);

        let sent = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let sent_p = Arc::clone(&sent);
        let received_c = Arc::clone(&received);

        let producer = thread::spawn(move || {
            if ring_p.push(100) {
                sent_p.fetch_add(1, Ordering::SeqCst);
            }
            if ring_p.push(200) {
                sent_p.fetch_add(1, Ordering::SeqCst);
            }
        });

        let consumer = thread::spawn(move || {
            for _ in 0..4 {
                if ring_c.pop().is_some() {
                    received_c.fetch_add(1, Ordering::SeqCst);
                }
                loom::thread::yield_now();
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();

        let s = sent.load(Ordering::SeqCst);
        let r = received.load(Ordering::SeqCst);
        assert!(r <= s, "received {} but only sent {}", r, s);
    });
}

/// Two producers releasing out of order into the pending bitmap: whichever
/// finishes second may complete before the one that claimed an earlier
/// index, but the in-order cursor only ever advances once both have
/// released, in claim order.
#[test]
fn loom_nonblocking_release_merges_out_of_order() {
    loom::model(|| {
        let released = Arc::new(AtomicU64::new(pack(0, 0)));

        // Thread A claimed index 0 (len 1), thread B claimed index 1 (len 1).
        let released_a = Arc::clone(&released);
        let a = thread::spawn(move || release_nonblocking(&released_a, 0, 1));

        let released_b = Arc::clone(&released);
        let b = thread::spawn(move || release_nonblocking(&released_b, 1, 1));

        a.join().unwrap();
        b.join().unwrap();

        // Regardless of interleaving, both releases are eventually folded
        // into the in-order cursor once both have completed.
        let word = released.load(Ordering::SeqCst);
        assert_eq!(cur_of(word), 2);
        assert_eq!(pend_of(word), 0);
    });
}

fn release_nonblocking(loc: &AtomicU64, idx: u32, n: u32) {
    let observed = loop {
        let old = pack(idx, 0);
        let neu = pack(idx.wrapping_add(n), 0);
        match loc.compare_exchange(old, neu, Ordering::Release, Ordering::Relaxed) {
            Ok(_) => return,
            Err(cur) => {
                let delta = idx.wrapping_add(n).wrapping_sub(cur_of(cur));
                if delta <= PENDMAX {
                    break cur;
                }
            }
        }
    };

    let mut old = observed;
    loop {
        let cur = cur_of(old);
        let offset = idx.wrapping_sub(cur);
        let our_pend: u64 = ((1u64 << n) - 1) << offset;
        let existing_pend = u64::from(pend_of(old));
        let new_pend = existing_pend | our_pend;
        let inorder = (!new_pend).trailing_zeros().min(32);
        let neu_cur = cur.wrapping_add(inorder);
        let neu_pend = (new_pend >> inorder) as u32;
        let neu = pack(neu_cur, neu_pend);
        match loc.compare_exchange(old, neu, Ordering::Release, Ordering::Relaxed) {
            Ok(_) => return,
            Err(cur2) => old = cur2,
        }
    }
}
