//! Lock-free queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every enqueued element is in the queue or was dequeued |
//! | NoDuplicates | No element appears twice in the queue |
//! | NoPhantomDequeues | Every dequeued element was enqueued, and dequeued once |
//! | FIFO_Order | Replaying the history against a model queue matches every dequeue |

use std::collections::{HashSet, VecDeque};

use super::history::{History, OpKind};
use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "lockfree_queue";

/// Properties that any FIFO queue implementation must satisfy.
pub trait QueueProperties {
    fn enqueued_elements(&self) -> HashSet<u64>;

    fn dequeued_elements(&self) -> HashSet<u64>;

    /// Current contents, front (next to dequeue) first.
    fn current_contents(&self) -> Vec<u64>;

    /// Linearized operation history.
    fn history(&self) -> History;
}

/// Property checker for queue implementations.
pub struct QueuePropertyChecker<'a, T: QueueProperties> {
    queue: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: QueueProperties> QueuePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(queue: &'a T) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn check_no_lost_elements(&self) -> PropertyResult {
        let enqueued = self.queue.enqueued_elements();
        let dequeued = self.queue.dequeued_elements();
        let contents: HashSet<u64> = self.queue.current_contents().into_iter().collect();

        let lost = enqueued
            .iter()
            .filter(|e| !contents.contains(e) && !dequeued.contains(e))
            .min()
            .copied();

        match lost {
            None => PropertyResult::pass("NoLostElements", STRUCTURE),
            Some(element) => {
                let mut ce = Counterexample::for_seed(self.dst_seed);
                ce.add_state(StateSnapshot {
                    step: 1,
                    description: format!("Element {} lost", element),
                    variables: vec![
                        ("enqueued".to_string(), enqueued.len().to_string()),
                        ("dequeued".to_string(), dequeued.len().to_string()),
                        ("contents".to_string(), contents.len().to_string()),
                    ],
                });
                PropertyResult::fail(
                    "NoLostElements",
                    STRUCTURE,
                    format!(
                        "Element {} was enqueued but is neither in queue nor dequeued",
                        element
                    ),
                    Some(ce),
                )
            }
        }
    }

    fn check_no_duplicates(&self) -> PropertyResult {
        let contents = self.queue.current_contents();
        let mut seen = HashSet::with_capacity(contents.len());
        match contents.iter().find(|e| !seen.insert(**e)) {
            Some(element) => PropertyResult::fail(
                "NoDuplicates",
                STRUCTURE,
                format!("Element {} appears multiple times in queue", element),
                None,
            ),
            None => PropertyResult::pass("NoDuplicates", STRUCTURE),
        }
    }

    fn check_no_phantom_dequeues(&self) -> PropertyResult {
        let enqueued = self.queue.enqueued_elements();
        let history = self.queue.history();
        let mut seen = HashSet::new();

        for op in history.operations.iter().filter(|op| op.kind == OpKind::Remove) {
            let Some(element) = op.element else { continue };
            if !enqueued.contains(&element) || !seen.insert(element) {
                return PropertyResult::fail(
                    "NoPhantomDequeues",
                    STRUCTURE,
                    format!(
                        "dequeue returned {} at step {} which was not available",
                        element, op.step
                    ),
                    None,
                );
            }
        }
        PropertyResult::pass("NoPhantomDequeues", STRUCTURE)
    }

    fn check_fifo_order(&self) -> PropertyResult {
        let history = self.queue.history();
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in &history.operations {
            let failure = match op.kind {
                OpKind::Insert => {
                    model.extend(op.element);
                    None
                }
                OpKind::Remove => match (op.element, model.pop_front()) {
                    (Some(got), Some(expected)) if got != expected => Some(format!(
                        "FIFO violated: dequeue returned {} but model expected {} (step {})",
                        got, expected, op.step
                    )),
                    (Some(got), None) => Some(format!(
                        "FIFO violated: dequeue returned {} but model queue was empty (step {})",
                        got, op.step
                    )),
                    _ => None,
                },
                OpKind::RemoveEmpty if !model.is_empty() => Some(format!(
                    "FIFO violated: dequeue returned None but model has {} elements (step {})",
                    model.len(),
                    op.step
                )),
                OpKind::RemoveEmpty => None,
            };

            if let Some(message) = failure {
                let mut ce = Counterexample::for_seed(self.dst_seed);
                ce.add_state(StateSnapshot {
                    step: op.step,
                    description: message.clone(),
                    variables: vec![("model_front".to_string(), format!("{:?}", model.front()))],
                });
                return PropertyResult::fail("FIFO_Order", STRUCTURE, message, Some(ce));
            }
        }

        PropertyResult::pass("FIFO_Order", STRUCTURE)
    }
}

impl<'a, T: QueueProperties> PropertyChecker for QueuePropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_no_phantom_dequeues(),
            self.check_fifo_order(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ModelQueue {
        items: VecDeque<u64>,
        enqueued: HashSet<u64>,
        dequeued: HashSet<u64>,
        history: History,
    }

    impl ModelQueue {
        fn enqueue(&mut self, v: u64) {
            self.items.push_back(v);
            self.enqueued.insert(v);
            let step = self.history.next_step();
            self.history.record_insert(0, v, step);
        }

        fn dequeue(&mut self) -> Option<u64> {
            let v = self.items.pop_front();
            self.dequeued.extend(v);
            let step = self.history.next_step();
            self.history.record_remove(0, v, step);
            v
        }
    }

    impl QueueProperties for ModelQueue {
        fn enqueued_elements(&self) -> HashSet<u64> {
            self.enqueued.clone()
        }
        fn dequeued_elements(&self) -> HashSet<u64> {
            self.dequeued.clone()
        }
        fn current_contents(&self) -> Vec<u64> {
            self.items.iter().copied().collect()
        }
        fn history(&self) -> History {
            self.history.clone()
        }
    }

    #[test]
    fn test_correct_queue_passes() {
        let mut queue = ModelQueue::default();
        for v in 1..=5 {
            queue.enqueue(v);
        }
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        queue.enqueue(6);

        assert!(QueuePropertyChecker::new(&queue).all_hold());
    }

    #[test]
    fn test_fifo_violation_detected() {
        let mut queue = ModelQueue::default();
        queue.enqueue(1);
        queue.enqueue(2);
        // LIFO answer recorded as a dequeue.
        queue.items.pop_back();
        queue.dequeued.insert(2);
        queue.history.record_remove(0, Some(2), 3);

        let violations = QueuePropertyChecker::new(&queue).with_seed(5).violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "FIFO_Order");
    }

    #[test]
    fn test_empty_dequeue_with_pending_items_detected() {
        let mut queue = ModelQueue::default();
        queue.enqueue(1);
        queue.history.record_remove(0, None, 2);

        assert!(!QueuePropertyChecker::new(&queue).all_hold());
    }
}
