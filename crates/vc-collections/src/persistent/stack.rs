//! Immutable singly-linked stack.

use std::fmt;
use std::sync::Arc;

use crate::error::{CollectionError, Result};

/// A persistent LIFO stack. `push` and `pop` return new stacks that share
/// their tail with the receiver; cloning is O(1).
pub struct PersistentStack<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

struct Node<T> {
    value: T,
    next: Option<Arc<Node<T>>>,
}

impl<T> PersistentStack<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self { head: None, len: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn push(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn pop(&self) -> Result<Self> {
        let node = self
            .head
            .as_ref()
            .ok_or(CollectionError::EmptyCollection("stack"))?;
        Ok(Self {
            head: node.next.clone(),
            len: self.len - 1,
        })
    }

    pub fn peek(&self) -> Result<&T> {
        self.head
            .as_deref()
            .map(|node| &node.value)
            .ok_or(CollectionError::EmptyCollection("stack"))
    }

    /// Top to bottom.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
            remaining: self.len,
        }
    }
}

impl<T: Clone> PersistentStack<T> {
    /// A new stack with the order reversed. O(n); nothing is shared.
    #[must_use]
    pub fn reverse(&self) -> Self {
        self.iter()
            .fold(Self::empty(), |acc, value| acc.push(value.clone()))
    }
}

impl<T> Clone for PersistentStack<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for PersistentStack<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// The last item of the iterator ends up on top.
impl<T> FromIterator<T> for PersistentStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, value| acc.push(value))
    }
}

impl<T: PartialEq> PartialEq for PersistentStack<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for PersistentStack<T> {}

impl<T: fmt::Debug> fmt::Debug for PersistentStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Drop for PersistentStack<T> {
    // Unlink uniquely owned nodes one at a time; the default recursive drop
    // overflows the call stack on long chains.
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a PersistentStack<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_peek() {
        let empty = PersistentStack::empty();
        let one = empty.push(1);
        let two = one.push(2);

        assert_eq!(two.peek(), Ok(&2));
        assert_eq!(two.len(), 2);
        assert_eq!(two.pop().unwrap(), one);
        assert_eq!(one.pop().unwrap(), empty);
        assert!(empty.is_empty());
        assert_eq!(empty.peek(), Err(CollectionError::EmptyCollection("stack")));
        assert!(empty.pop().is_err());
    }

    #[test]
    fn test_versions_are_independent() {
        let base: PersistentStack<i32> = (1..=3).collect();
        let pushed = base.push(4);
        let popped = base.pop().unwrap();

        assert_eq!(base.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(pushed.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2, 1]);
        assert_eq!(popped.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_reverse() {
        let stack: PersistentStack<i32> = (1..=4).collect();
        let reversed = stack.reverse();
        assert_eq!(reversed.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(reversed.len(), 4);
        assert_eq!(stack.peek(), Ok(&4));
    }

    #[test]
    fn test_long_chain_drops() {
        let stack: PersistentStack<u32> = (0..200_000).collect();
        let shared = stack.pop().unwrap();
        drop(stack);
        assert_eq!(shared.len(), 199_999);
    }
}
