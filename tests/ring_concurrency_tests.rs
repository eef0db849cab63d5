//! Cross-thread stress tests for the ring buffer's multi-producer/
//! multi-consumer disciplines: total-count preservation, FIFO order where
//! promised, and lock-free dequeue's at-most-once-per-element guarantee.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use syncring::ring::{Blocking, LockFree, Single};
use syncring::RingBuffer;

#[test]
fn spsc_capacity_four_fills_then_drains_in_order() {
    let r = RingBuffer::<u32, Single, Single>::alloc(4).unwrap();
    let p = r.producer();
    let c = r.consumer();

    for v in [b'A', b'B', b'C', b'D'] {
        assert!(p.push(u32::from(v)).is_ok());
    }
    assert_eq!(p.push(u32::from(b'E')), Err(u32::from(b'E')));

    for v in [b'A', b'B', b'C', b'D'] {
        assert_eq!(c.pop(), Some(u32::from(v)));
    }
    assert_eq!(c.pop(), None);
}

#[test]
fn blocking_mpmc_preserves_total_count_and_multiset() {
    const PRODUCERS: u32 = 2;
    const CONSUMERS: u32 = 2;
    const PER_PRODUCER: u32 = 4_000;

    let r = Arc::new(RingBuffer::<u32, Blocking, Blocking>::alloc(8).unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                let p = r.producer();
                for i in 0..PER_PRODUCER {
                    let value = t * PER_PRODUCER + i;
                    loop {
                        if p.push(value).is_ok() {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let total = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let target = (PRODUCERS * PER_PRODUCER) as usize;
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let r = Arc::clone(&r);
            let total = Arc::clone(&total);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let c = r.consumer();
                loop {
                    if total.load(Ordering::SeqCst) >= target {
                        break;
                    }
                    if let Some(v) = c.pop() {
                        seen.lock().unwrap().push(v);
                        total.fetch_add(1, Ordering::SeqCst);
                    } else {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    for h in consumers {
        h.join().unwrap();
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), target);
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), target, "every enqueued value must be dequeued exactly once");
}

#[test]
fn lock_free_dequeue_each_element_claimed_at_most_once() {
    const TOTAL: u32 = 4_000;

    let r = Arc::new(RingBuffer::<u32, Single, LockFree>::alloc(2048).unwrap());
    {
        let p = r.producer();
        for i in 0..TOTAL {
            loop {
                if p.push(i).is_ok() {
                    break;
                }
            }
        }
    }

    let total = Arc::new(AtomicUsize::new(0));
    let claims = Arc::new(std::sync::Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let r = Arc::clone(&r);
            let total = Arc::clone(&total);
            let claims = Arc::clone(&claims);
            thread::spawn(move || {
                let c = r.consumer();
                let mut buf = [0u32; 4];
                loop {
                    let n = c.dequeue_into(&mut buf);
                    if n == 0 {
                        if total.load(Ordering::SeqCst) as u32 >= TOTAL {
                            break;
                        }
                        thread::yield_now();
                        continue;
                    }
                    claims.lock().unwrap().extend_from_slice(&buf[..n]);
                    total.fetch_add(n, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let claims = claims.lock().unwrap();
    assert_eq!(claims.len(), TOTAL as usize);
    let unique: HashSet<_> = claims.iter().copied().collect();
    assert_eq!(unique.len(), TOTAL as usize, "every element must be claimed exactly once");
}
