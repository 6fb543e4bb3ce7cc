//! Treiber stack with epoch-based reclamation.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, loom |
//! | NoDuplicates | DST, loom |
//! | LIFO_Order | DST, kani |
//! | ABA_Safety | epoch GC |
//!
//! # Memory Safety
//!
//! A popped node is retired through crossbeam-epoch and freed only after
//! every thread that could still hold a reference has unpinned. Values stay
//! inside their node until then, which is why `try_pop` and `try_peek`
//! hand out clones: a concurrent peeker may be reading the same node.

use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use vc_dst::{ContainerOrder, DstTestableContainer};

use super::backoff::Backoff;
use crate::error::{CollectionError, Result};

/// A lock-free LIFO stack.
///
/// Operations are linearizable and lock-free (some thread always makes
/// progress), not wait-free.
pub struct LockFreeStack<T> {
    head: Atomic<Node<T>>,
}

struct Node<T> {
    value: T,
    next: Atomic<Node<T>>,
}

impl<T> LockFreeStack<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    pub fn push(&self, value: T) {
        let guard = epoch::pin();
        let mut node = Owned::new(Node {
            value,
            next: Atomic::null(),
        });
        let mut backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            node.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return,
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Number of nodes reachable from the head. O(n) and only a snapshot
    /// under concurrent modification.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let mut count = 0;
        let mut current = self.head.load(Ordering::Acquire, &guard);
        // Safety: nodes reachable from a pinned load are not reclaimed
        // until the guard drops.
        while let Some(node) = unsafe { current.as_ref() } {
            count += 1;
            current = node.next.load(Ordering::Acquire, &guard);
        }
        count
    }

    /// Pop the head if `predicate` accepts its value.
    ///
    /// Returns `false` when the stack is empty or the head does not match.
    /// A concurrent pop that changes the head makes the check run again on
    /// the new head.
    pub fn compare_and_pop_by<F>(&self, predicate: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        let guard = epoch::pin();
        self.pop_if(&guard, |value| predicate(value)).is_some()
    }

    /// Detach every node. Nodes are retired, not freed, so concurrent
    /// readers stay valid.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let mut current = self.head.swap(Shared::null(), Ordering::AcqRel, &guard);
        while !current.is_null() {
            // Safety: the chain was detached by the swap above, so this
            // thread is the only one retiring these nodes.
            unsafe {
                let next = current.deref().next.load(Ordering::Acquire, &guard);
                guard.defer_destroy(current);
                current = next;
            }
        }
    }

    /// CAS the head off when `accept` says so. Returns the unlinked node,
    /// still readable under `guard`.
    fn pop_if<'g, F>(&self, guard: &'g Guard, accept: F) -> Option<&'g Node<T>>
    where
        F: Fn(&T) -> bool,
    {
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            // Safety: protected by `guard`.
            let node = unsafe { head.as_ref() }?;
            if !accept(&node.value) {
                return None;
            }
            let next = node.next.load(Ordering::Acquire, guard);

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                // Safety: the CAS unlinked `head`; only this thread retires it.
                unsafe { guard.defer_destroy(head) };
                return Some(node);
            }
            backoff.spin();
        }
    }
}

impl<T: Clone> LockFreeStack<T> {
    pub fn try_pop(&self) -> Option<T> {
        let guard = epoch::pin();
        self.pop_if(&guard, |_| true).map(|node| node.value.clone())
    }

    pub fn pop(&self) -> Result<T> {
        self.try_pop().ok_or(CollectionError::EmptyCollection("stack"))
    }

    /// Read the head without removing it. A single load, no CAS.
    #[must_use]
    pub fn try_peek(&self) -> Option<T> {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        // Safety: protected by `guard`.
        unsafe { head.as_ref() }.map(|node| node.value.clone())
    }

    /// Snapshot of the contents, top first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        let guard = epoch::pin();
        let mut items = Vec::new();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        // Safety: protected by `guard`.
        while let Some(node) = unsafe { current.as_ref() } {
            items.push(node.value.clone());
            current = node.next.load(Ordering::Acquire, &guard);
        }
        items
    }
}

impl<T: PartialEq> LockFreeStack<T> {
    /// Pop the head only if it equals `expected`.
    pub fn compare_and_pop(&self, expected: &T) -> bool {
        self.compare_and_pop_by(|value| value == expected)
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The last item of the iterator ends up on top.
impl<T> FromIterator<T> for LockFreeStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let stack = Self::new();
        for item in iter {
            stack.push(item);
        }
        stack
    }
}

impl<T> fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeStack").field("len", &self.len()).finish()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        // Safety: `&mut self` means no other thread can reach these nodes.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let node = current.into_owned();
                current = node.next.load(Ordering::Relaxed, guard);
            }
        }
    }
}

impl DstTestableContainer for LockFreeStack<u64> {
    const ORDER: ContainerOrder = ContainerOrder::Lifo;

    fn new() -> Self {
        LockFreeStack::new()
    }

    fn insert(&self, value: u64) {
        self.push(value);
    }

    fn remove(&self) -> Option<u64> {
        self.try_pop()
    }

    fn is_empty(&self) -> bool {
        LockFreeStack::is_empty(self)
    }

    fn contents(&self) -> Vec<u64> {
        self.to_vec()
    }

    fn collect_garbage(&self) {
        epoch::pin().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_push_pop() {
        let stack = LockFreeStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.try_pop(), Some(3));
        assert_eq!(stack.try_pop(), Some(2));
        assert_eq!(stack.try_pop(), Some(1));
        assert_eq!(stack.try_pop(), None);
        assert_eq!(stack.pop(), Err(CollectionError::EmptyCollection("stack")));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let stack: LockFreeStack<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(stack.try_peek().as_deref(), Some("b"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.to_vec(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_compare_and_pop() {
        let stack: LockFreeStack<i32> = (1..=3).collect();
        assert!(!stack.compare_and_pop(&1));
        assert!(stack.compare_and_pop(&3));
        assert!(stack.compare_and_pop_by(|v| v % 2 == 0));
        assert_eq!(stack.to_vec(), vec![1]);

        let empty: LockFreeStack<i32> = LockFreeStack::new();
        assert!(!empty.compare_and_pop(&1));
    }

    #[test]
    fn test_clear() {
        let stack: LockFreeStack<u64> = (0..100).collect();
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
        stack.push(7);
        assert_eq!(stack.try_pop(), Some(7));
    }

    #[test]
    fn test_drop_frees_values() {
        let marker = Arc::new(());
        {
            let stack = LockFreeStack::new();
            for _ in 0..10 {
                stack.push(Arc::clone(&marker));
            }
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_concurrent_push_pop() {
        let stack = Arc::new(LockFreeStack::new());
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let stack = Arc::clone(&stack);
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    stack.push(t * 1000 + i);
                    if i % 3 == 0 {
                        stack.try_pop();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let remaining = stack.to_vec();
        let unique: std::collections::HashSet<_> = remaining.iter().collect();
        assert_eq!(unique.len(), remaining.len());
        // 4 threads * 250 pushes, 84 pops each (i = 0, 3, ..., 249).
        assert_eq!(remaining.len(), 1000 - 4 * 84);
    }
}
