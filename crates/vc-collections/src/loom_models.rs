//! Raw-pointer models of the lock-free stack and queue for loom.
//!
//! loom cannot see through crossbeam-epoch, so these models replace epoch
//! reclamation with a retire list: unlinked nodes are parked until the
//! structure is dropped. Addresses are therefore never reused while the
//! structure is alive, which rules out ABA, and no node is freed while
//! another thread may still read it. The CAS protocols are the same as in
//! [`crate::lockfree`].
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p vc-collections --release loom
//! ```

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, Ordering};
#[cfg(loom)]
use loom::sync::Mutex;

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, Ordering};
#[cfg(not(loom))]
use std::sync::Mutex;

use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr;
use std::sync::PoisonError;

fn spin() {
    #[cfg(loom)]
    loom::thread::yield_now();
    #[cfg(not(loom))]
    std::hint::spin_loop();
}

struct RetireList<N> {
    nodes: Mutex<Vec<*mut N>>,
}

impl<N> RetireList<N> {
    fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    fn retire(&self, node: *mut N) {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    /// Safety: caller has exclusive access and every retired node's payload
    /// has already been moved out.
    unsafe fn free_all(&self) {
        let nodes = std::mem::take(&mut *self.nodes.lock().unwrap_or_else(PoisonError::into_inner));
        for node in nodes {
            drop(Box::from_raw(node));
        }
    }
}

/// Treiber stack over raw pointers.
pub struct LoomStack<T> {
    head: AtomicPtr<StackNode<T>>,
    retired: RetireList<StackNode<T>>,
}

struct StackNode<T> {
    value: ManuallyDrop<T>,
    next: *mut StackNode<T>,
}

impl<T> LoomStack<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            retired: RetireList::new(),
        }
    }

    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(StackNode {
            value: ManuallyDrop::new(value),
            next: ptr::null_mut(),
        }));
        loop {
            let head = self.head.load(Ordering::Acquire);
            // Safety: `node` is not published yet.
            unsafe { (*node).next = head };
            if self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            spin();
        }
    }

    pub fn pop(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // Safety: nodes are only freed on drop, so `head` is readable
            // even if another thread already unlinked it.
            let next = unsafe { (*head).next };
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Safety: the CAS winner is the only thread to take the value.
                let value = unsafe { ManuallyDrop::take(&mut (*head).value) };
                self.retired.retire(head);
                return Some(value);
            }
            spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for LoomStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LoomStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        // Safety: `&mut self`; every retired node's value was taken.
        unsafe { self.retired.free_all() };
    }
}

// Safety: values move between threads; nodes are shared only through atomics.
unsafe impl<T: Send> Send for LoomStack<T> {}
unsafe impl<T: Send> Sync for LoomStack<T> {}

/// Michael–Scott queue over raw pointers, with a sentinel head.
pub struct LoomQueue<T> {
    head: AtomicPtr<QueueNode<T>>,
    tail: AtomicPtr<QueueNode<T>>,
    retired: RetireList<QueueNode<T>>,
}

struct QueueNode<T> {
    value: MaybeUninit<T>,
    next: AtomicPtr<QueueNode<T>>,
}

impl<T> QueueNode<T> {
    fn boxed(value: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

impl<T> LoomQueue<T> {
    pub fn new() -> Self {
        let sentinel = QueueNode::boxed(MaybeUninit::uninit());
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            retired: RetireList::new(),
        }
    }

    pub fn enqueue(&self, value: T) {
        let node = QueueNode::boxed(MaybeUninit::new(value));
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // Safety: the tail is never null and never freed before drop.
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };
            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            // Safety: as above.
            let linked = unsafe {
                (*tail)
                    .next
                    .compare_exchange(ptr::null_mut(), node, Ordering::Release, Ordering::Relaxed)
            };
            if linked.is_ok() {
                let _ = self
                    .tail
                    .compare_exchange(tail, node, Ordering::Release, Ordering::Relaxed);
                return;
            }
            spin();
        }
    }

    pub fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            // Safety: the head is never null and never freed before drop.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }
            if head == tail {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Safety: `next` became the sentinel; only the CAS winner
                // reads its value.
                let value = unsafe { (*next).value.assume_init_read() };
                self.retired.retire(head);
                return Some(value);
            }
            spin();
        }
    }
}

impl<T> Default for LoomQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LoomQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
        // Safety: `&mut self`; the sentinel and retired nodes hold no value.
        unsafe {
            drop(Box::from_raw(self.head.load(Ordering::Relaxed)));
            self.retired.free_all();
        }
    }
}

// Safety: as for `LoomStack`.
unsafe impl<T: Send> Send for LoomQueue<T> {}
unsafe impl<T: Send> Sync for LoomQueue<T> {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stack_lifo() {
        let stack = LoomStack::new();
        for i in 1..=3 {
            stack.push(i);
        }
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_queue_fifo() {
        let queue = LoomQueue::new();
        for i in 1..=3 {
            queue.enqueue(i);
        }
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_drop_releases_values() {
        let marker = Arc::new(());
        {
            let stack = LoomStack::new();
            let queue = LoomQueue::new();
            for _ in 0..5 {
                stack.push(Arc::clone(&marker));
                queue.enqueue(Arc::clone(&marker));
            }
            drop(stack.pop());
            drop(queue.dequeue());
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_concurrent_queue_std() {
        let queue = Arc::new(LoomQueue::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.enqueue(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut drained = Vec::new();
        while let Some(v) = queue.dequeue() {
            drained.push(v);
        }
        drained.sort_unstable();
        drained.dedup();
        assert_eq!(drained.len(), 400);
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_stack_concurrent_push() {
        loom::model(|| {
            let stack = Arc::new(LoomStack::new());
            let s1 = Arc::clone(&stack);
            let s2 = Arc::clone(&stack);

            let h1 = thread::spawn(move || s1.push(1));
            let h2 = thread::spawn(move || s2.push(2));
            h1.join().unwrap();
            h2.join().unwrap();

            let mut values = vec![];
            while let Some(v) = stack.pop() {
                values.push(v);
            }
            values.sort();
            assert_eq!(values, vec![1, 2]);
        });
    }

    #[test]
    fn loom_stack_single_element_popped_once() {
        loom::model(|| {
            let stack = Arc::new(LoomStack::new());
            stack.push(1);
            let s1 = Arc::clone(&stack);
            let s2 = Arc::clone(&stack);

            let h1 = thread::spawn(move || s1.pop());
            let h2 = thread::spawn(move || s2.pop());

            match (h1.join().unwrap(), h2.join().unwrap()) {
                (Some(1), None) | (None, Some(1)) => {}
                other => panic!("value popped {:?}", other),
            }
        });
    }

    #[test]
    fn loom_queue_enqueue_dequeue() {
        loom::model(|| {
            let queue = Arc::new(LoomQueue::new());
            queue.enqueue(1);
            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);

            let h1 = thread::spawn(move || q1.enqueue(2));
            let h2 = thread::spawn(move || q2.dequeue());
            h1.join().unwrap();

            // The element enqueued first always leaves first.
            assert_eq!(h2.join().unwrap(), Some(1));
            assert_eq!(queue.dequeue(), Some(2));
            assert_eq!(queue.dequeue(), None);
        });
    }

    #[test]
    fn loom_queue_concurrent_enqueue_keeps_both() {
        loom::model(|| {
            let queue = Arc::new(LoomQueue::new());
            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);

            let h1 = thread::spawn(move || q1.enqueue(1));
            let h2 = thread::spawn(move || q2.enqueue(2));
            h1.join().unwrap();
            h2.join().unwrap();

            let mut values = vec![];
            while let Some(v) = queue.dequeue() {
                values.push(v);
            }
            values.sort();
            assert_eq!(values, vec![1, 2]);
        });
    }
}
