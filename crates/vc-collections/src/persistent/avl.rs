//! Immutable AVL tree with path copying.
//!
//! `add` and `remove` rebuild only the nodes on the path from the root to
//! the change; every other subtree is shared with the previous version.
//! Each node caches its height and subtree size.
//!
//! Balance is `height(right) - height(left)`. A rebuilt node with balance
//! `>= 2` rotates left, or right-then-left when its right child leans left;
//! `<= -2` is symmetric.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::stack::PersistentStack;
use crate::error::{CollectionError, Result};

type Link<K, V> = Option<Arc<AvlNode<K, V>>>;

struct AvlNode<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
    height: usize,
    len: usize,
}

fn height<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |node| node.height)
}

fn size<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |node| node.len)
}

fn balance<K, V>(link: &Link<K, V>) -> isize {
    link.as_ref().map_or(0, |node| {
        height(&node.right) as isize - height(&node.left) as isize
    })
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<AvlNode<K, V>> {
    Arc::new(AvlNode {
        height: 1 + height(&left).max(height(&right)),
        len: 1 + size(&left) + size(&right),
        key,
        value,
        left,
        right,
    })
}

impl<K: Clone, V: Clone> AvlNode<K, V> {
    fn with_children(&self, left: Link<K, V>, right: Link<K, V>) -> Arc<Self> {
        make(self.key.clone(), self.value.clone(), left, right)
    }
}

fn rotate_left<K: Clone, V: Clone>(node: &AvlNode<K, V>) -> Arc<AvlNode<K, V>> {
    match &node.right {
        Some(pivot) => {
            let lowered = node.with_children(node.left.clone(), pivot.left.clone());
            pivot.with_children(Some(lowered), pivot.right.clone())
        }
        None => node.with_children(node.left.clone(), None),
    }
}

fn rotate_right<K: Clone, V: Clone>(node: &AvlNode<K, V>) -> Arc<AvlNode<K, V>> {
    match &node.left {
        Some(pivot) => {
            let lowered = node.with_children(pivot.right.clone(), node.right.clone());
            pivot.with_children(pivot.left.clone(), Some(lowered))
        }
        None => node.with_children(None, node.right.clone()),
    }
}

fn rebalance<K: Clone, V: Clone>(node: Arc<AvlNode<K, V>>) -> Arc<AvlNode<K, V>> {
    let tilt = height(&node.right) as isize - height(&node.left) as isize;
    if tilt >= 2 {
        if balance(&node.right) < 0 {
            let right = node.right.as_deref().map(rotate_right);
            return rotate_left(&node.with_children(node.left.clone(), right));
        }
        return rotate_left(&node);
    }
    if tilt <= -2 {
        if balance(&node.left) > 0 {
            let left = node.left.as_deref().map(rotate_left);
            return rotate_right(&node.with_children(left, node.right.clone()));
        }
        return rotate_right(&node);
    }
    node
}

fn insert<K, V>(link: &Link<K, V>, key: K, value: V) -> Arc<AvlNode<K, V>>
where
    K: Ord + Clone,
    V: Clone,
{
    let Some(node) = link else {
        return make(key, value, None, None);
    };
    match key.cmp(&node.key) {
        Ordering::Less => {
            let left = insert(&node.left, key, value);
            rebalance(node.with_children(Some(left), node.right.clone()))
        }
        Ordering::Greater => {
            let right = insert(&node.right, key, value);
            rebalance(node.with_children(node.left.clone(), Some(right)))
        }
        Ordering::Equal => make(key, value, node.left.clone(), node.right.clone()),
    }
}

/// `None` when `key` is absent.
fn delete<K, V>(link: &Link<K, V>, key: &K) -> Option<Link<K, V>>
where
    K: Ord + Clone,
    V: Clone,
{
    let node = link.as_ref()?;
    let rebuilt = match key.cmp(&node.key) {
        Ordering::Less => {
            let left = delete(&node.left, key)?;
            node.with_children(left, node.right.clone())
        }
        Ordering::Greater => {
            let right = delete(&node.right, key)?;
            node.with_children(node.left.clone(), right)
        }
        Ordering::Equal => match (&node.left, &node.right) {
            (None, None) => return Some(None),
            (Some(only), None) | (None, Some(only)) => return Some(Some(Arc::clone(only))),
            (Some(_), Some(right)) => {
                let successor = leftmost(right);
                let right = delete(&node.right, &successor.key)?;
                make(
                    successor.key.clone(),
                    successor.value.clone(),
                    node.left.clone(),
                    right,
                )
            }
        },
    };
    Some(Some(rebalance(rebuilt)))
}

fn leftmost<K, V>(node: &Arc<AvlNode<K, V>>) -> &Arc<AvlNode<K, V>> {
    let mut current = node;
    while let Some(left) = &current.left {
        current = left;
    }
    current
}

/// A persistent AVL tree map.
///
/// Every operation leaves the receiver untouched. Sharing a tree between
/// threads is safe; publishing a new root to other threads (for example
/// through an `arc_swap::ArcSwap`) is the caller's job.
pub struct PersistentAvlTree<K, V> {
    root: Link<K, V>,
}

impl<K, V> PersistentAvlTree<K, V> {
    #[must_use]
    pub const fn empty() -> Self {
        Self { root: None }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// 0 for the empty tree, 1 for a single node.
    #[must_use]
    pub fn height(&self) -> usize {
        height(&self.root)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        size(&self.root)
    }

    /// Key at the root.
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        self.root.as_ref().map(|node| &node.key)
    }

    /// Value at the root.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        self.root.as_ref().map(|node| &node.value)
    }

    #[must_use]
    pub fn left(&self) -> Self {
        Self {
            root: self.root.as_ref().and_then(|node| node.left.clone()),
        }
    }

    #[must_use]
    pub fn right(&self) -> Self {
        Self {
            root: self.root.as_ref().and_then(|node| node.right.clone()),
        }
    }

    /// In-order pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            pending: PersistentStack::empty(),
            remaining: self.len(),
        };
        iter.descend_left(self.root.as_deref());
        iter
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: Ord, V> PersistentAvlTree<K, V> {
    /// The subtree rooted at `key`, or the empty tree.
    #[must_use]
    pub fn search(&self, key: &K) -> Self {
        let mut current = &self.root;
        while let Some(node) = current {
            match key.cmp(&node.key) {
                Ordering::Less => current = &node.left,
                Ordering::Greater => current = &node.right,
                Ordering::Equal => {
                    return Self {
                        root: Some(Arc::clone(node)),
                    }
                }
            }
        }
        Self::empty()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            match key.cmp(&node.key) {
                Ordering::Less => current = node.left.as_deref(),
                Ordering::Greater => current = node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Ord + fmt::Debug, V> PersistentAvlTree<K, V> {
    pub fn lookup(&self, key: &K) -> Result<&V> {
        self.get(key)
            .ok_or_else(|| CollectionError::KeyNotFound(format!("{:?}", key)))
    }
}

impl<K: Ord + Clone, V: Clone> PersistentAvlTree<K, V> {
    /// A tree that also maps `key` to `value`. An existing key has its value
    /// replaced.
    #[must_use]
    pub fn add(&self, key: K, value: V) -> Self {
        Self {
            root: Some(insert(&self.root, key, value)),
        }
    }
}

impl<K: Ord + Clone + fmt::Debug, V: Clone> PersistentAvlTree<K, V> {
    /// A tree without `key`. Removing an absent key reaches an empty
    /// subtree, which is an [`CollectionError::InvariantViolation`].
    pub fn remove(&self, key: &K) -> Result<Self> {
        let root = delete(&self.root, key).ok_or_else(|| {
            CollectionError::InvariantViolation(format!(
                "cannot remove {:?}: reached an empty tree",
                key
            ))
        })?;
        Ok(Self { root })
    }
}

impl<K, V> Clone for PersistentAvlTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for PersistentAvlTree<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for PersistentAvlTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |tree, (key, value)| tree.add(key, value))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentAvlTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order traversal driven by a persistent stack of pending ancestors.
pub struct Iter<'a, K, V> {
    pending: PersistentStack<&'a AvlNode<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn descend_left(&mut self, mut node: Option<&'a AvlNode<K, V>>) {
        while let Some(current) = node {
            self.pending = self.pending.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = *self.pending.peek().ok()?;
        self.pending = self.pending.pop().ok()?;
        self.descend_left(node.right.as_deref());
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
