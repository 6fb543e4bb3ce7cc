//! Michael–Scott queue with epoch-based reclamation.
//!
//! The queue always holds a sentinel node at `head`; the first real value
//! lives in `head.next`. Dequeue swings `head` forward, and the old
//! sentinel is retired. `tail` may lag one node behind the true end; every
//! operation that notices a stale tail helps swing it forward.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, loom |
//! | NoDuplicates | DST, loom |
//! | FIFO_Order | DST, kani |

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use vc_dst::{ContainerOrder, DstTestableContainer};

use super::backoff::Backoff;
use crate::error::{CollectionError, Result};

/// A lock-free FIFO queue.
pub struct LockFreeQueue<T> {
    head: Atomic<Node<T>>,
    tail: Atomic<Node<T>>,
}

struct Node<T> {
    // Uninitialized in the sentinel, and again once the value has been
    // moved out by the dequeuer that made this node the sentinel.
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }
}

// Safety: values are moved between threads, never shared by reference.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        let queue = Self {
            head: Atomic::null(),
            tail: Atomic::null(),
        };
        // Safety: the queue is not shared yet.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = Owned::new(Node::sentinel()).into_shared(guard);
            queue.head.store(sentinel, Ordering::Relaxed);
            queue.tail.store(sentinel, Ordering::Relaxed);
        }
        queue
    }

    pub fn enqueue(&self, value: T) {
        let guard = epoch::pin();
        let node = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(&guard);
        let mut backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            // Safety: the tail is never null and is protected by `guard`.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, &guard);

            if !next.is_null() {
                // Stale tail: help the lagging enqueuer, then retry.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(
                    Shared::null(),
                    node,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                )
                .is_ok()
            {
                // Best effort. A failure means someone already helped.
                let _ = self.tail.compare_exchange(
                    tail,
                    node,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                return;
            }
            backoff.spin();
        }
    }

    pub fn try_dequeue(&self) -> Option<T> {
        let guard = epoch::pin();
        self.dequeue_with(&guard)
    }

    pub fn dequeue(&self) -> Result<T> {
        self.try_dequeue()
            .ok_or(CollectionError::EmptyCollection("queue"))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        // Safety: the head is never null and is protected by `guard`.
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, &guard)
            .is_null()
    }

    /// Number of values linked after the sentinel. O(n), a snapshot only.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let mut count = 0;
        self.for_each_value(&guard, |_| count += 1);
        count
    }

    fn dequeue_with(&self, guard: &Guard) -> Option<T> {
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // Safety: the head is never null and is protected by `guard`.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
            // Safety: protected by `guard`.
            let next_ref = unsafe { next.as_ref() }?;

            if head == tail {
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                // Safety: winning the CAS makes `next` the new sentinel, so
                // only this thread reads its value, exactly once. The old
                // sentinel's value was already moved out (or never set).
                unsafe {
                    let value = ptr::read(next_ref.value.as_ptr());
                    guard.defer_destroy(head);
                    return Some(value);
                }
            }
            backoff.spin();
        }
    }

    fn for_each_value<'g, F>(&self, guard: &'g Guard, mut f: F)
    where
        T: 'g,
        F: FnMut(&'g T),
    {
        let head = self.head.load(Ordering::Acquire, guard);
        // Safety: the head is never null and is protected by `guard`.
        let mut current = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
        // Safety: nodes after the sentinel hold initialized values until
        // they become the sentinel themselves.
        while let Some(node) = unsafe { current.as_ref() } {
            f(unsafe { node.value.assume_init_ref() });
            current = node.next.load(Ordering::Acquire, guard);
        }
    }
}

impl<T: Copy> LockFreeQueue<T> {
    /// Values front first.
    ///
    /// Limited to `Copy` values: a concurrent dequeuer may move a value out
    /// while it is being read, which is only harmless for plain bits.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let guard = epoch::pin();
        let mut items = Vec::new();
        self.for_each_value(&guard, |value| items.push(*value));
        items
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for LockFreeQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let queue = Self::new();
        for item in iter {
            queue.enqueue(item);
        }
        queue
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue").field("len", &self.len()).finish()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Safety: `&mut self` means no other thread can reach these nodes.
        unsafe {
            let guard = epoch::unprotected();
            while self.dequeue_with(guard).is_some() {}
            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl DstTestableContainer for LockFreeQueue<u64> {
    const ORDER: ContainerOrder = ContainerOrder::Fifo;

    fn new() -> Self {
        LockFreeQueue::new()
    }

    fn insert(&self, value: u64) {
        self.enqueue(value);
    }

    fn remove(&self) -> Option<u64> {
        self.try_dequeue()
    }

    fn is_empty(&self) -> bool {
        LockFreeQueue::is_empty(self)
    }

    fn contents(&self) -> Vec<u64> {
        self.snapshot()
    }

    fn collect_garbage(&self) {
        epoch::pin().flush();
    }
}
