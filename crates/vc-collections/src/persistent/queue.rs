//! Immutable FIFO queue on two persistent stacks.
//!
//! `forwards` holds the front in dequeue order and `backwards` holds newer
//! items in reverse. When `forwards` runs dry, `backwards` is reversed into
//! it. `forwards` is empty only when the whole queue is.

use std::fmt;

use super::stack::PersistentStack;
use crate::error::{CollectionError, Result};

pub struct PersistentQueue<T> {
    forwards: PersistentStack<T>,
    backwards: PersistentStack<T>,
}

impl<T> PersistentQueue<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            forwards: PersistentStack::empty(),
            backwards: PersistentStack::empty(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forwards.len() + self.backwards.len()
    }

    pub fn peek(&self) -> Result<&T> {
        self.forwards
            .peek()
            .map_err(|_| CollectionError::EmptyCollection("queue"))
    }

    /// Front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut back: Vec<&T> = self.backwards.iter().collect();
        back.reverse();
        self.forwards.iter().chain(back)
    }
}

impl<T: Clone> PersistentQueue<T> {
    #[must_use]
    pub fn enqueue(&self, value: T) -> Self {
        if self.is_empty() {
            return Self {
                forwards: PersistentStack::empty().push(value),
                backwards: PersistentStack::empty(),
            };
        }
        Self {
            forwards: self.forwards.clone(),
            backwards: self.backwards.push(value),
        }
    }

    pub fn dequeue(&self) -> Result<Self> {
        let forwards = self
            .forwards
            .pop()
            .map_err(|_| CollectionError::EmptyCollection("queue"))?;
        if !forwards.is_empty() {
            return Ok(Self {
                forwards,
                backwards: self.backwards.clone(),
            });
        }
        Ok(Self {
            forwards: self.backwards.reverse(),
            backwards: PersistentStack::empty(),
        })
    }
}

impl<T> Clone for PersistentQueue<T> {
    fn clone(&self) -> Self {
        Self {
            forwards: self.forwards.clone(),
            backwards: self.backwards.clone(),
        }
    }
}

impl<T> Default for PersistentQueue<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> FromIterator<T> for PersistentQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |queue, value| queue.enqueue(value))
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
