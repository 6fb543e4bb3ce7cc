//! Operation history shared by the stack and queue checkers.
//!
//! A history is a linearized log: operations appear in the order they took
//! effect. The DST harness produces one naturally because simulated threads
//! run one operation at a time.

/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// push / enqueue
    Insert,
    /// pop / dequeue that returned an element
    Remove,
    /// pop / dequeue that found the structure empty
    RemoveEmpty,
}

/// A single recorded operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Logical thread that performed the operation
    pub thread_id: u64,
    pub kind: OpKind,
    /// Inserted element, or the element a remove returned
    pub element: Option<u64>,
    /// Step number for ordering
    pub step: u64,
}

/// Linearized operation log.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub operations: Vec<Operation>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insert (push or enqueue).
    pub fn record_insert(&mut self, thread_id: u64, element: u64, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(Operation {
            thread_id,
            kind: OpKind::Insert,
            element: Some(element),
            step,
        });
    }

    /// Record a remove (pop or dequeue); `None` means it found nothing.
    pub fn record_remove(&mut self, thread_id: u64, element: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(Operation {
            thread_id,
            kind: if element.is_some() {
                OpKind::Remove
            } else {
                OpKind::RemoveEmpty
            },
            element,
            step,
        });
    }

    /// Next step number: one past the last recorded step.
    #[must_use]
    pub fn next_step(&self) -> u64 {
        self.operations.last().map_or(1, |op| op.step + 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Elements inserted, in order.
    pub fn inserted(&self) -> impl Iterator<Item = u64> + '_ {
        self.operations
            .iter()
            .filter(|op| op.kind == OpKind::Insert)
            .filter_map(|op| op.element)
    }

    /// Elements removed, in order.
    pub fn removed(&self) -> impl Iterator<Item = u64> + '_ {
        self.operations
            .iter()
            .filter(|op| op.kind == OpKind::Remove)
            .filter_map(|op| op.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_filter() {
        let mut history = History::new();
        assert_eq!(history.next_step(), 1);

        history.record_insert(0, 10, 1);
        history.record_insert(1, 20, 2);
        history.record_remove(0, Some(20), 3);
        history.record_remove(1, None, 4);

        assert_eq!(history.len(), 4);
        assert_eq!(history.next_step(), 5);
        assert_eq!(history.inserted().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(history.removed().collect::<Vec<_>>(), vec![20]);
        assert_eq!(history.operations[3].kind, OpKind::RemoveEmpty);
    }
}
