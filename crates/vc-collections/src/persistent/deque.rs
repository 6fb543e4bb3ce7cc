//! Immutable double-ended queue with finger-tree style digits.
//!
//! A deep deque is a left digit, a middle deque and a right digit. Digits
//! hold between 1 and 4 elements. The middle is a deque of buckets: each
//! bucket is a digit of the level above, so an element `d` levels down is
//! wrapped in `d` buckets. When a side digit is full, the new value and its
//! nearest neighbour form a fresh two-element digit and the other three
//! move into the middle as one bucket. Dequeue refills an exhausted side
//! from the middle, then from the other side.
//!
//! All levels share one element type ([`Elem`]), which keeps the recursion
//! monomorphic.

use std::fmt;
use std::sync::Arc;

use crate::error::{CollectionError, Result};

const DIGIT_MAX: usize = 4;

type Digit<T> = Vec<Elem<T>>;

#[derive(Clone)]
enum Elem<T> {
    Value(T),
    Bucket(Arc<Digit<T>>),
}

#[derive(Clone)]
enum Tree<T> {
    Empty,
    Single(Elem<T>),
    Deep(Arc<Deep<T>>),
}

#[derive(Clone)]
struct Deep<T> {
    left: Digit<T>,
    middle: Tree<T>,
    right: Digit<T>,
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl<T> Elem<T> {
    fn edge(&self, side: Side) -> Option<&T> {
        let mut elem = self;
        loop {
            match elem {
                Elem::Value(value) => return Some(value),
                Elem::Bucket(digit) => {
                    elem = match side {
                        Side::Left => digit.first()?,
                        Side::Right => digit.last()?,
                    }
                }
            }
        }
    }
}

impl<T: Clone> Elem<T> {
    fn into_digit(self) -> Digit<T> {
        match self {
            Elem::Bucket(digit) => Arc::try_unwrap(digit).unwrap_or_else(|shared| (*shared).clone()),
            Elem::Value(_) => unreachable!("the middle of a deque holds only buckets"),
        }
    }
}

impl<T> Tree<T> {
    fn edge(&self, side: Side) -> Option<&T> {
        match self {
            Tree::Empty => None,
            Tree::Single(elem) => elem.edge(side),
            Tree::Deep(_) => self.edge_elem(side).and_then(|elem| elem.edge(side)),
        }
    }

    fn digit_sizes(&self, sizes: &mut Vec<usize>) {
        fn walk<T>(digit: &Digit<T>, sizes: &mut Vec<usize>) {
            sizes.push(digit.len());
            for elem in digit {
                if let Elem::Bucket(inner) = elem {
                    walk(inner, sizes);
                }
            }
        }

        let mut tree = self;
        loop {
            match tree {
                Tree::Empty => return,
                Tree::Single(Elem::Value(_)) => return,
                Tree::Single(Elem::Bucket(digit)) => return walk(digit, sizes),
                Tree::Deep(deep) => {
                    walk(&deep.left, sizes);
                    walk(&deep.right, sizes);
                    tree = &deep.middle;
                }
            }
        }
    }
}

impl<T: Clone> Tree<T> {
    fn enqueue(&self, side: Side, elem: Elem<T>) -> Self {
        match self {
            Tree::Empty => Tree::Single(elem),
            Tree::Single(only) => {
                let (left, right) = match side {
                    Side::Left => (vec![elem], vec![only.clone()]),
                    Side::Right => (vec![only.clone()], vec![elem]),
                };
                Tree::Deep(Arc::new(Deep {
                    left,
                    middle: Tree::Empty,
                    right,
                }))
            }
            Tree::Deep(deep) => {
                let mut deep = Deep::clone(deep);
                match side {
                    Side::Left if deep.left.len() < DIGIT_MAX => deep.left.insert(0, elem),
                    Side::Right if deep.right.len() < DIGIT_MAX => deep.right.push(elem),
                    Side::Left => {
                        // [a b c d] -> [elem a] with [b c d] pushed inward.
                        let moved = deep.left.split_off(1);
                        deep.left.insert(0, elem);
                        deep.middle = deep.middle.enqueue(side, Elem::Bucket(Arc::new(moved)));
                    }
                    Side::Right => {
                        // [a b c d] -> [d elem] with [a b c] pushed inward.
                        let kept = deep.right.split_off(DIGIT_MAX - 1);
                        let moved = std::mem::replace(&mut deep.right, kept);
                        deep.right.push(elem);
                        deep.middle = deep.middle.enqueue(side, Elem::Bucket(Arc::new(moved)));
                    }
                }
                Tree::Deep(Arc::new(deep))
            }
        }
    }

    fn dequeue(&self, side: Side) -> Option<Self> {
        let deep = match self {
            Tree::Empty => return None,
            Tree::Single(_) => return Some(Tree::Empty),
            Tree::Deep(deep) => deep,
        };

        let (near, far) = match side {
            Side::Left => (&deep.left, &deep.right),
            Side::Right => (&deep.right, &deep.left),
        };

        let (near, middle, far) = if near.len() > 1 {
            let near = match side {
                Side::Left => near[1..].to_vec(),
                Side::Right => near[..near.len() - 1].to_vec(),
            };
            (near, deep.middle.clone(), far.clone())
        } else if let Some(bucket) = deep.middle.edge_elem(side) {
            let middle = deep.middle.dequeue(side).unwrap_or(Tree::Empty);
            (bucket.clone().into_digit(), middle, far.clone())
        } else if far.len() > 1 {
            let (borrowed, rest) = match side {
                Side::Left => (far[..1].to_vec(), far[1..].to_vec()),
                Side::Right => (far[far.len() - 1..].to_vec(), far[..far.len() - 1].to_vec()),
            };
            (borrowed, Tree::Empty, rest)
        } else {
            return Some(Tree::Single(far[0].clone()));
        };

        let (left, right) = match side {
            Side::Left => (near, far),
            Side::Right => (far, near),
        };
        Some(Tree::Deep(Arc::new(Deep {
            left,
            middle,
            right,
        })))
    }
}

impl<T> Tree<T> {
    /// Outermost element on `side`, without descending into buckets.
    fn edge_elem(&self, side: Side) -> Option<&Elem<T>> {
        match self {
            Tree::Empty => None,
            Tree::Single(elem) => Some(elem),
            Tree::Deep(deep) => match side {
                Side::Left => deep.left.first(),
                Side::Right => deep.right.last(),
            },
        }
    }
}

/// A persistent deque. Every operation returns a new deque; existing
/// versions are never changed and share structure with their successors.
#[derive(Clone)]
pub struct PersistentDeque<T> {
    tree: Tree<T>,
    len: usize,
}

impl<T> PersistentDeque<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            tree: Tree::Empty,
            len: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.tree, Tree::Empty)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn peek_left(&self) -> Result<&T> {
        self.tree
            .edge(Side::Left)
            .ok_or(CollectionError::EmptyCollection("deque"))
    }

    pub fn peek_right(&self) -> Result<&T> {
        self.tree
            .edge(Side::Right)
            .ok_or(CollectionError::EmptyCollection("deque"))
    }

    /// Left to right.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            frames: vec![Frame::Tree(&self.tree)],
            remaining: self.len,
        }
    }

    /// Sizes of every digit, side digits and buckets alike, at every depth.
    #[must_use]
    pub fn digit_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        self.tree.digit_sizes(&mut sizes);
        sizes
    }
}

impl<T: Clone> PersistentDeque<T> {
    #[must_use]
    pub fn enqueue_left(&self, value: T) -> Self {
        Self {
            tree: self.tree.enqueue(Side::Left, Elem::Value(value)),
            len: self.len + 1,
        }
    }

    #[must_use]
    pub fn enqueue_right(&self, value: T) -> Self {
        Self {
            tree: self.tree.enqueue(Side::Right, Elem::Value(value)),
            len: self.len + 1,
        }
    }

    pub fn dequeue_left(&self) -> Result<Self> {
        self.dequeue(Side::Left)
    }

    pub fn dequeue_right(&self) -> Result<Self> {
        self.dequeue(Side::Right)
    }

    fn dequeue(&self, side: Side) -> Result<Self> {
        let tree = self
            .tree
            .dequeue(side)
            .ok_or(CollectionError::EmptyCollection("deque"))?;
        Ok(Self {
            tree,
            len: self.len - 1,
        })
    }
}

impl<T> Default for PersistentDeque<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Items are appended on the right, so iteration order is preserved.
impl<T: Clone> FromIterator<T> for PersistentDeque<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |deque, value| deque.enqueue_right(value))
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentDeque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

enum Frame<'a, T> {
    Tree(&'a Tree<T>),
    Elem(&'a Elem<T>),
}

pub struct Iter<'a, T> {
    frames: Vec<Frame<'a, T>>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Elem(Elem::Value(value)) => {
                    self.remaining -= 1;
                    return Some(value);
                }
                Frame::Elem(Elem::Bucket(digit)) => {
                    self.frames.extend(digit.iter().rev().map(Frame::Elem));
                }
                Frame::Tree(Tree::Empty) => {}
                Frame::Tree(Tree::Single(elem)) => self.frames.push(Frame::Elem(elem)),
                Frame::Tree(Tree::Deep(deep)) => {
                    self.frames.extend(deep.right.iter().rev().map(Frame::Elem));
                    self.frames.push(Frame::Tree(&deep.middle));
                    self.frames.extend(deep.left.iter().rev().map(Frame::Elem));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a PersistentDeque<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
