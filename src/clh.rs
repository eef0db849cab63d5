//! CLH queue lock: FIFO mutual exclusion where each waiter spins on its
//! own predecessor's node instead of a single shared word.
//!
//! Under heavy contention this beats [`crate::ticket::TicketLock`], whose
//! waiters all spin on the same cache line and thrash it on every release.
//! Here each waiter only ever touches the node handed to it by whoever
//! queued ahead of it.

use crate::atomic::wait_until_bool;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// A single link in the implicit CLH queue.
struct ClhNode {
    wait: AtomicBool,
}

impl ClhNode {
    fn new(wait: bool) -> Box<Self> {
        Box::new(Self {
            wait: AtomicBool::new(wait),
        })
    }
}

/// Per-thread reusable storage for CLH nodes.
///
/// Each call to [`ClhLock::lock`] needs a node to publish and, afterward,
/// inherits its predecessor's node to reuse on the *next* call — that node
/// is dead weight the moment our own `wait` flag is cleared by whoever
/// queues behind us. Callers own one `ClhHandle` per thread (or per
/// logical lock-holder) and pass it to every `lock` call on a given
/// `ClhLock`.
pub struct ClhHandle {
    node: Option<Box<ClhNode>>,
}

impl ClhHandle {
    /// Creates an empty handle; the first `lock` call allocates its node.
    pub const fn new() -> Self {
        Self { node: None }
    }
}

impl Default for ClhHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A FIFO mutual-exclusion lock around a `T`, queue-based rather than
/// counter-based.
pub struct ClhLock<T> {
    tail: AtomicPtr<ClhNode>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ClhLock<T> {}
unsafe impl<T: Send> Sync for ClhLock<T> {}

impl<T> ClhLock<T> {
    /// Creates a new, unlocked lock wrapping `data`, with an initial
    /// sentinel node whose `wait` flag is already clear.
    pub fn new(data: T) -> Self {
        let sentinel = Box::into_raw(ClhNode::new(false));
        Self {
            tail: AtomicPtr::new(sentinel),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, queuing behind whoever currently holds the
    /// tail. `handle` is reused across calls on the same thread so each
    /// acquire only allocates a node the very first time it's called.
    pub fn lock<'a>(&'a self, handle: &'a mut ClhHandle) -> ClhGuard<'a, T> {
        let mut my_node = handle.node.take().unwrap_or_else(|| ClhNode::new(true));
        my_node.wait.store(true, Ordering::Relaxed);
        let my_ptr = Box::into_raw(my_node);

        let pred_ptr = self.tail.swap(my_ptr, Ordering::AcqRel);
        // SAFETY: `pred_ptr` was the tail published by some earlier
        // `lock` call (or the initial sentinel), and is freed only by
        // whichever call reclaims it into a `ClhHandle` or by
        // `ClhLock::drop`, both of which happen after every spinner on it
        // has observed `wait == false` and stopped touching it.
        let pred = unsafe { &*pred_ptr };
        wait_until_bool(&pred.wait, false, Ordering::Acquire);

        // Reclaim the predecessor's node for our next acquire; drop the
        // old handle contents (there shouldn't be any left).
        handle.node = Some(unsafe { Box::from_raw(pred_ptr) });

        ClhGuard {
            lock: self,
            my_node_ptr: my_ptr,
        }
    }

    fn release(&self, node_ptr: *mut ClhNode) {
        // SAFETY: `node_ptr` is the node this guard published in `lock`;
        // it stays valid until whoever queues behind us reclaims it.
        let node = unsafe { &*node_ptr };
        node.wait.store(false, Ordering::Release);
    }
}

impl<T> Drop for ClhLock<T> {
    fn drop(&mut self) {
        let ptr = *self.tail.get_mut();
        if !ptr.is_null() {
            // SAFETY: no other reference to the lock (and hence to the
            // queue) can exist once `ClhLock` itself is being dropped.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

/// RAII guard returned by [`ClhLock::lock`]; releases in FIFO order on
/// drop.
pub struct ClhGuard<'a, T> {
    lock: &'a ClhLock<T>,
    my_node_ptr: *mut ClhNode,
}

impl<T> Deref for ClhGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for ClhGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for ClhGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release(self.my_node_ptr);
    }
}
