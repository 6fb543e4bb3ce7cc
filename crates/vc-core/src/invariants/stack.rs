//! Lock-free stack invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element is in the stack or was popped |
//! | NoDuplicates | No element appears twice in the stack |
//! | NoPhantomPops | Every popped element was pushed, and popped at most once |
//! | LIFO_Order | Replaying the history against a model stack matches every pop |

use std::collections::HashSet;

use super::history::{History, OpKind};
use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "lockfree_stack";

/// Properties that any stack implementation must satisfy.
///
/// Implementations (usually a test wrapper around the real stack) provide
/// access to their tracked state; the checker verifies invariants against
/// it.
pub trait StackProperties {
    /// Set of all elements that have been pushed.
    fn pushed_elements(&self) -> HashSet<u64>;

    /// Set of all elements that have been popped.
    fn popped_elements(&self) -> HashSet<u64>;

    /// Current contents of the stack (top to bottom).
    fn current_contents(&self) -> Vec<u64>;

    /// Linearized operation history.
    fn history(&self) -> History;
}

/// Property checker for stack implementations.
pub struct StackPropertyChecker<'a, T: StackProperties> {
    stack: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: StackProperties> StackPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(stack: &'a T) -> Self {
        Self {
            stack,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    /// Every element that was pushed must either be in the stack or have
    /// been popped.
    fn check_no_lost_elements(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let popped = self.stack.popped_elements();
        let contents: HashSet<u64> = self.stack.current_contents().into_iter().collect();

        let mut lost: Vec<u64> = pushed
            .iter()
            .filter(|e| !contents.contains(e) && !popped.contains(e))
            .copied()
            .collect();
        if lost.is_empty() {
            return PropertyResult::pass("NoLostElements", STRUCTURE);
        }
        lost.sort_unstable();

        let mut ce = Counterexample::for_seed(self.dst_seed);
        ce.add_state(StateSnapshot {
            step: 1,
            description: format!("Element {} lost", lost[0]),
            variables: vec![
                ("lost".to_string(), format!("{:?}", lost)),
                ("pushed".to_string(), pushed.len().to_string()),
                ("popped".to_string(), popped.len().to_string()),
                ("contents".to_string(), contents.len().to_string()),
            ],
        });

        PropertyResult::fail(
            "NoLostElements",
            STRUCTURE,
            format!(
                "Element {} was pushed but is neither in stack nor popped ({} lost in total)",
                lost[0],
                lost.len()
            ),
            Some(ce),
        )
    }

    fn check_no_duplicates(&self) -> PropertyResult {
        let contents = self.stack.current_contents();
        let mut seen = HashSet::with_capacity(contents.len());
        for element in &contents {
            if !seen.insert(*element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    STRUCTURE,
                    format!("Element {} appears multiple times in stack", element),
                    None,
                );
            }
        }
        PropertyResult::pass("NoDuplicates", STRUCTURE)
    }

    /// A pop may only return what some push inserted, and each pushed
    /// element comes out at most once.
    fn check_no_phantom_pops(&self) -> PropertyResult {
        let history = self.stack.history();
        let pushed = self.stack.pushed_elements();
        let mut seen = HashSet::new();

        for op in &history.operations {
            if op.kind != OpKind::Remove {
                continue;
            }
            let Some(element) = op.element else { continue };
            if !pushed.contains(&element) {
                return PropertyResult::fail(
                    "NoPhantomPops",
                    STRUCTURE,
                    format!("pop returned {} which was never pushed (step {})", element, op.step),
                    None,
                );
            }
            if !seen.insert(element) {
                return PropertyResult::fail(
                    "NoPhantomPops",
                    STRUCTURE,
                    format!("Element {} popped twice (second at step {})", element, op.step),
                    None,
                );
            }
        }
        PropertyResult::pass("NoPhantomPops", STRUCTURE)
    }

    /// Replay the history against a model stack and check that every pop
    /// result matches.
    fn check_lifo_order(&self) -> PropertyResult {
        let history = self.stack.history();
        let mut model: Vec<u64> = Vec::new();
        let mut ce = Counterexample::for_seed(self.dst_seed);

        for op in &history.operations {
            let failure = match op.kind {
                OpKind::Insert => {
                    if let Some(e) = op.element {
                        model.push(e);
                    }
                    None
                }
                OpKind::Remove => match (op.element, model.pop()) {
                    (Some(got), Some(expected)) if got != expected => Some(format!(
                        "LIFO violated: pop returned {} but model expected {} (step {})",
                        got, expected, op.step
                    )),
                    (Some(got), None) => Some(format!(
                        "LIFO violated: pop returned {} but model stack was empty (step {})",
                        got, op.step
                    )),
                    _ => None,
                },
                OpKind::RemoveEmpty if !model.is_empty() => Some(format!(
                    "LIFO violated: pop returned None but model has {} elements (step {})",
                    model.len(),
                    op.step
                )),
                OpKind::RemoveEmpty => None,
            };

            if let Some(message) = failure {
                ce.add_state(StateSnapshot {
                    step: op.step,
                    description: message.clone(),
                    variables: vec![("model_top".to_string(), format!("{:?}", model.last()))],
                });
                return PropertyResult::fail("LIFO_Order", STRUCTURE, message, Some(ce));
            }
        }

        PropertyResult::pass("LIFO_Order", STRUCTURE)
    }
}

impl<'a, T: StackProperties> PropertyChecker for StackPropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_no_phantom_pops(),
            self.check_lifo_order(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ModelStack {
        items: Vec<u64>,
        pushed: HashSet<u64>,
        popped: HashSet<u64>,
        history: History,
    }

    impl ModelStack {
        fn push(&mut self, v: u64) {
            self.items.push(v);
            self.pushed.insert(v);
            let step = self.history.next_step();
            self.history.record_insert(0, v, step);
        }

        fn pop(&mut self) -> Option<u64> {
            let v = self.items.pop();
            if let Some(v) = v {
                self.popped.insert(v);
            }
            let step = self.history.next_step();
            self.history.record_remove(0, v, step);
            v
        }
    }

    impl StackProperties for ModelStack {
        fn pushed_elements(&self) -> HashSet<u64> {
            self.pushed.clone()
        }
        fn popped_elements(&self) -> HashSet<u64> {
            self.popped.clone()
        }
        fn current_contents(&self) -> Vec<u64> {
            self.items.iter().rev().copied().collect()
        }
        fn history(&self) -> History {
            self.history.clone()
        }
    }

    #[test]
    fn test_correct_stack_passes() {
        let mut stack = ModelStack::default();
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.pop(), Some(2));
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);

        let checker = StackPropertyChecker::new(&stack).with_seed(7);
        assert!(checker.all_hold(), "{:?}", checker.violations());
    }

    #[test]
    fn test_lost_element_detected() {
        let mut stack = ModelStack::default();
        stack.push(1);
        stack.push(2);
        // Drop the top without recording it as popped.
        stack.items.pop();

        let results = StackPropertyChecker::new(&stack).with_seed(99).check_all();
        let lost = results.iter().find(|r| r.name == "NoLostElements").unwrap();
        assert!(!lost.holds);
        assert_eq!(lost.counterexample.as_ref().unwrap().dst_seed, Some(99));
    }

    #[test]
    fn test_lifo_violation_detected() {
        let mut stack = ModelStack::default();
        stack.push(1);
        stack.push(2);
        // A FIFO answer recorded as a pop.
        stack.items.remove(0);
        stack.popped.insert(1);
        stack.history.record_remove(0, Some(1), 3);

        let results = StackPropertyChecker::new(&stack).check_all();
        let lifo = results.iter().find(|r| r.name == "LIFO_Order").unwrap();
        assert!(!lifo.holds);
        assert!(lifo.violation.as_ref().unwrap().contains("model expected 2"));
    }

    #[test]
    fn test_double_pop_detected() {
        let mut stack = ModelStack::default();
        stack.push(5);
        stack.pop();
        stack.history.record_remove(1, Some(5), 10);

        let results = StackPropertyChecker::new(&stack).check_all();
        let phantom = results.iter().find(|r| r.name == "NoPhantomPops").unwrap();
        assert!(!phantom.holds);
    }
}
