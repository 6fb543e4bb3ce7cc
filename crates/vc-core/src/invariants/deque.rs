//! Persistent deque invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | ContentsMatchModel | Left-to-right contents equal a `VecDeque` model |
//! | DigitBounds | Every digit holds between 1 and 4 elements |
//! | PeekConsistency | Peeks agree with the ends of the contents |
//! | EmptinessConsistency | `is_empty` agrees with the contents |

use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "persistent_deque";

/// Properties any persistent deque must satisfy.
pub trait DequeProperties {
    /// Elements, left to right.
    fn contents(&self) -> Vec<u64>;

    /// What a reference model holds after the same operations.
    fn expected_contents(&self) -> Vec<u64>;

    /// Sizes of every digit at every depth.
    fn digit_sizes(&self) -> Vec<usize>;

    fn peek_left(&self) -> Option<u64>;

    fn peek_right(&self) -> Option<u64>;

    fn is_empty(&self) -> bool;
}

pub struct DequePropertyChecker<'a, T: DequeProperties> {
    deque: &'a T,
}

impl<'a, T: DequeProperties> DequePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(deque: &'a T) -> Self {
        Self { deque }
    }

    fn check_contents_match_model(&self) -> PropertyResult {
        let actual = self.deque.contents();
        let expected = self.deque.expected_contents();
        if actual != expected {
            return PropertyResult::fail(
                "ContentsMatchModel",
                STRUCTURE,
                format!("deque holds {:?}, model holds {:?}", actual, expected),
                None,
            );
        }
        PropertyResult::pass("ContentsMatchModel", STRUCTURE)
    }

    fn check_digit_bounds(&self) -> PropertyResult {
        match self
            .deque
            .digit_sizes()
            .into_iter()
            .find(|size| !(1..=4).contains(size))
        {
            Some(size) => PropertyResult::fail(
                "DigitBounds",
                STRUCTURE,
                format!("digit holds {} elements", size),
                None,
            ),
            None => PropertyResult::pass("DigitBounds", STRUCTURE),
        }
    }

    fn check_peek_consistency(&self) -> PropertyResult {
        let contents = self.deque.contents();
        let left = self.deque.peek_left();
        let right = self.deque.peek_right();
        if left != contents.first().copied() || right != contents.last().copied() {
            return PropertyResult::fail(
                "PeekConsistency",
                STRUCTURE,
                format!(
                    "peeks ({:?}, {:?}) disagree with contents ends ({:?}, {:?})",
                    left,
                    right,
                    contents.first(),
                    contents.last()
                ),
                None,
            );
        }
        PropertyResult::pass("PeekConsistency", STRUCTURE)
    }

    fn check_emptiness(&self) -> PropertyResult {
        let empty = self.deque.is_empty();
        let len = self.deque.contents().len();
        if empty != (len == 0) {
            return PropertyResult::fail(
                "EmptinessConsistency",
                STRUCTURE,
                format!("is_empty() = {} with {} elements", empty, len),
                None,
            );
        }
        PropertyResult::pass("EmptinessConsistency", STRUCTURE)
    }
}

impl<'a, T: DequeProperties> PropertyChecker for DequePropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_contents_match_model(),
            self.check_digit_bounds(),
            self.check_peek_consistency(),
            self.check_emptiness(),
        ]
    }
}
