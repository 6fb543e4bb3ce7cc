//! Kani proof harnesses for the sequential behaviour of the collections.
//!
//! ```bash
//! cargo kani -p vc-collections
//! cargo kani -p vc-collections --harness proof_avl_insert_keeps_order
//! ```
//!
//! Kani has no thread model, so these proofs cover single-threaded
//! correctness only. Interleavings are covered by the loom models and the
//! DST runners.

#[cfg(kani)]
mod proofs {
    use crate::lockfree::{LockFreeQueue, LockFreeStack};
    use crate::persistent::{PersistentAvlTree, PersistentDeque, PersistentQueue, PersistentStack};

    /// Pushing v1 then v2 pops v2 first.
    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_lockfree_stack_lifo() {
        let stack = LockFreeStack::new();
        let v1: u64 = kani::any();
        let v2: u64 = kani::any();
        kani::assume(v1 != v2);

        stack.push(v1);
        stack.push(v2);

        kani::assert(stack.try_pop() == Some(v2), "last pushed pops first");
        kani::assert(stack.try_pop() == Some(v1), "first pushed pops last");
        kani::assert(stack.try_pop().is_none(), "drained stack is empty");
    }

    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_lockfree_queue_fifo() {
        let queue = LockFreeQueue::new();
        let v1: u64 = kani::any();
        let v2: u64 = kani::any();

        queue.enqueue(v1);
        queue.enqueue(v2);

        kani::assert(queue.try_dequeue() == Some(v1), "first enqueued leaves first");
        kani::assert(queue.try_dequeue() == Some(v2), "second enqueued leaves second");
        kani::assert(queue.is_empty(), "drained queue is empty");
    }

    /// Pushing never changes the version it was called on.
    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_persistent_stack_push_preserves_receiver() {
        let base = PersistentStack::empty().push(1u8);
        let value: u8 = kani::any();
        let pushed = base.push(value);

        kani::assert(base.len() == 1, "receiver length unchanged");
        kani::assert(base.peek() == Ok(&1), "receiver top unchanged");
        kani::assert(pushed.peek() == Ok(&value), "new version has the value on top");
    }

    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_persistent_queue_fifo() {
        let a: u8 = kani::any();
        let b: u8 = kani::any();
        let queue = PersistentQueue::empty().enqueue(a).enqueue(b);

        kani::assert(queue.peek() == Ok(&a), "front is the first enqueued");
        let rest = queue.dequeue();
        kani::assert(rest.is_ok(), "non-empty queue dequeues");
        if let Ok(rest) = rest {
            kani::assert(rest.peek() == Ok(&b), "second element moves to the front");
        }
    }

    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_deque_ends() {
        let left: u8 = kani::any();
        let right: u8 = kani::any();
        let deque = PersistentDeque::empty()
            .enqueue_right(1u8)
            .enqueue_left(left)
            .enqueue_right(right);

        kani::assert(deque.peek_left() == Ok(&left), "left end");
        kani::assert(deque.peek_right() == Ok(&right), "right end");
        kani::assert(deque.len() == 3, "length");
    }

    /// Three inserts in any order produce a balanced tree of height 2.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_avl_insert_keeps_order() {
        let a: u8 = kani::any();
        let b: u8 = kani::any();
        let c: u8 = kani::any();
        kani::assume(a != b && b != c && a != c);

        let tree = PersistentAvlTree::empty().add(a, ()).add(b, ()).add(c, ());

        kani::assert(tree.len() == 3, "three keys");
        kani::assert(tree.height() == 2, "three keys balance to height 2");
        let mut keys = tree.keys();
        let (k1, k2, k3) = (keys.next(), keys.next(), keys.next());
        kani::assert(k1 < k2 && k2 < k3, "in-order traversal is sorted");
    }

    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_avl_remove_absent_key_fails() {
        let key: u8 = kani::any();
        let other: u8 = kani::any();
        kani::assume(key != other);

        let tree = PersistentAvlTree::empty().add(key, ());
        kani::assert(tree.remove(&other).is_err(), "absent key cannot be removed");
        kani::assert(tree.remove(&key).map(|t| t.is_empty()) == Ok(true), "present key is removed");
    }
}

#[cfg(not(kani))]
mod proofs {}
