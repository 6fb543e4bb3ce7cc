//! Persistent AVL tree invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | SortedOrder | In-order traversal is strictly increasing |
//! | AvlBalance | `abs(height(right) - height(left)) <= 1` at every node |
//! | HeightCache | Cached height equals `1 + max(height(left), height(right))` |
//! | HeightBound | Root height stays within `1.44 * log2(n + 2)` |
//! | NoLostKeys | Traversal yields exactly the keys a model map holds |
//! | SizeConsistency | Reported length equals the traversal length |

use std::collections::HashSet;

use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "persistent_avl";

/// Heights observed at one node. Empty subtrees have height 0, leaves 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvlNodeShape {
    pub key: u64,
    pub cached_height: usize,
    pub left_height: usize,
    pub right_height: usize,
}

impl AvlNodeShape {
    /// `height(right) - height(left)`.
    #[must_use]
    pub fn balance(&self) -> i64 {
        self.right_height as i64 - self.left_height as i64
    }
}

/// Properties any AVL tree must satisfy.
pub trait AvlTreeProperties {
    /// Keys in in-order traversal order.
    fn in_order_keys(&self) -> Vec<u64>;

    /// Shape of every node, in any order.
    fn node_shapes(&self) -> Vec<AvlNodeShape>;

    /// Keys a model map says should be present.
    fn logical_keys(&self) -> HashSet<u64>;

    fn reported_len(&self) -> usize;

    fn reported_height(&self) -> usize;
}

/// Property checker for AVL tree implementations.
pub struct AvlTreePropertyChecker<'a, T: AvlTreeProperties> {
    tree: &'a T,
}

impl<'a, T: AvlTreeProperties> AvlTreePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(tree: &'a T) -> Self {
        Self { tree }
    }

    fn check_sorted_order(&self) -> PropertyResult {
        let keys = self.tree.in_order_keys();
        match keys.windows(2).position(|w| w[0] >= w[1]) {
            Some(i) => PropertyResult::fail(
                "SortedOrder",
                STRUCTURE,
                format!(
                    "Keys not strictly increasing: {} >= {} at positions {}, {}",
                    keys[i],
                    keys[i + 1],
                    i,
                    i + 1
                ),
                None,
            ),
            None => PropertyResult::pass("SortedOrder", STRUCTURE),
        }
    }

    fn check_balance(&self) -> PropertyResult {
        match self.tree.node_shapes().iter().find(|n| n.balance().abs() > 1) {
            Some(node) => PropertyResult::fail(
                "AvlBalance",
                STRUCTURE,
                format!(
                    "Node {} has balance {} (left={}, right={})",
                    node.key,
                    node.balance(),
                    node.left_height,
                    node.right_height
                ),
                None,
            ),
            None => PropertyResult::pass("AvlBalance", STRUCTURE),
        }
    }

    fn check_height_cache(&self) -> PropertyResult {
        let stale = self
            .tree
            .node_shapes()
            .into_iter()
            .find(|n| n.cached_height != 1 + n.left_height.max(n.right_height));
        match stale {
            Some(node) => PropertyResult::fail(
                "HeightCache",
                STRUCTURE,
                format!(
                    "Node {} caches height {} but children give {}",
                    node.key,
                    node.cached_height,
                    1 + node.left_height.max(node.right_height)
                ),
                None,
            ),
            None => PropertyResult::pass("HeightCache", STRUCTURE),
        }
    }

    fn check_height_bound(&self) -> PropertyResult {
        let n = self.tree.reported_len();
        let height = self.tree.reported_height();
        let bound = 1.44 * ((n + 2) as f64).log2();
        if height as f64 > bound {
            return PropertyResult::fail(
                "HeightBound",
                STRUCTURE,
                format!("Height {} exceeds {:.2} for {} nodes", height, bound, n),
                None,
            );
        }
        PropertyResult::pass("HeightBound", STRUCTURE)
    }

    fn check_no_lost_keys(&self) -> PropertyResult {
        let logical = self.tree.logical_keys();
        let found: HashSet<u64> = self.tree.in_order_keys().into_iter().collect();

        if let Some(key) = logical.difference(&found).min() {
            return PropertyResult::fail(
                "NoLostKeys",
                STRUCTURE,
                format!("Key {} exists logically but not found in traversal", key),
                None,
            );
        }
        if let Some(key) = found.difference(&logical).min() {
            return PropertyResult::fail(
                "NoLostKeys",
                STRUCTURE,
                format!("Key {} found in traversal but was removed or never added", key),
                None,
            );
        }
        PropertyResult::pass("NoLostKeys", STRUCTURE)
    }

    fn check_size_consistency(&self) -> PropertyResult {
        let traversed = self.tree.in_order_keys().len();
        let reported = self.tree.reported_len();
        if traversed != reported {
            return PropertyResult::fail(
                "SizeConsistency",
                STRUCTURE,
                format!("len() reports {} but traversal yields {}", reported, traversed),
                None,
            );
        }
        PropertyResult::pass("SizeConsistency", STRUCTURE)
    }
}

impl<'a, T: AvlTreeProperties> PropertyChecker for AvlTreePropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_sorted_order(),
            self.check_balance(),
            self.check_height_cache(),
            self.check_height_bound(),
            self.check_no_lost_keys(),
            self.check_size_consistency(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Snapshot {
        keys: Vec<u64>,
        shapes: Vec<AvlNodeShape>,
        height: usize,
    }

    impl AvlTreeProperties for Snapshot {
        fn in_order_keys(&self) -> Vec<u64> {
            self.keys.clone()
        }
        fn node_shapes(&self) -> Vec<AvlNodeShape> {
            self.shapes.clone()
        }
        fn logical_keys(&self) -> HashSet<u64> {
            self.keys.iter().copied().collect()
        }
        fn reported_len(&self) -> usize {
            self.keys.len()
        }
        fn reported_height(&self) -> usize {
            self.height
        }
    }

    fn leaf(key: u64) -> AvlNodeShape {
        AvlNodeShape {
            key,
            cached_height: 1,
            left_height: 0,
            right_height: 0,
        }
    }

    #[test]
    fn test_balanced_three_nodes() {
        let tree = Snapshot {
            keys: vec![1, 2, 3],
            shapes: vec![
                leaf(1),
                AvlNodeShape {
                    key: 2,
                    cached_height: 2,
                    left_height: 1,
                    right_height: 1,
                },
                leaf(3),
            ],
            height: 2,
        };
        assert!(AvlTreePropertyChecker::new(&tree).all_hold());
    }

    #[test]
    fn test_degenerate_chain_fails() {
        // 1 -> 2 -> 3 as a right spine.
        let tree = Snapshot {
            keys: vec![1, 2, 3],
            shapes: vec![
                AvlNodeShape {
                    key: 1,
                    cached_height: 3,
                    left_height: 0,
                    right_height: 2,
                },
                AvlNodeShape {
                    key: 2,
                    cached_height: 2,
                    left_height: 0,
                    right_height: 1,
                },
                leaf(3),
            ],
            height: 3,
        };
        let names: Vec<&str> = AvlTreePropertyChecker::new(&tree)
            .violations()
            .iter()
            .map(|r| r.name)
            .collect();
        assert!(names.contains(&"AvlBalance"));
    }

    #[test]
    fn test_unsorted_and_stale_height_fail() {
        let tree = Snapshot {
            keys: vec![2, 1],
            shapes: vec![
                AvlNodeShape {
                    key: 2,
                    cached_height: 1,
                    left_height: 1,
                    right_height: 0,
                },
                leaf(1),
            ],
            height: 2,
        };
        let names: Vec<&str> = AvlTreePropertyChecker::new(&tree)
            .violations()
            .iter()
            .map(|r| r.name)
            .collect();
        assert!(names.contains(&"SortedOrder"));
        assert!(names.contains(&"HeightCache"));
    }
}
