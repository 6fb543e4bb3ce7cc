//! Invariant traits for the verified collections.
//!
//! Each module defines the properties that implementations must satisfy.
//!
//! ## Lock-free structures
//! - `stack`: Treiber stack (NoLostElements, NoDuplicates, LIFO_Order)
//! - `queue`: Michael–Scott queue (NoLostElements, NoDuplicates, FIFO_Order)
//! - `history`: linearized operation log both replay against a model
//!
//! ## Persistent structures
//! - `avl`: AVL tree (SortedOrder, AvlBalance, HeightCache, HeightBound)
//! - `deque`: finger deque (ContentsMatchModel, DigitBounds)
//! - `persistence`: old versions never change
//!
//! ## Lock-based
//! - `indexed`: hash-partitioned indexes (IndexCoverage, NoStaleEntries)

pub mod avl;
pub mod deque;
pub mod history;
pub mod indexed;
pub mod persistence;
pub mod queue;
pub mod stack;

pub use avl::{AvlNodeShape, AvlTreeProperties, AvlTreePropertyChecker};
pub use deque::{DequeProperties, DequePropertyChecker};
pub use history::{History, OpKind, Operation};
pub use indexed::{IndexSnapshot, IndexedCollectionProperties, IndexedCollectionPropertyChecker};
pub use persistence::{PersistenceProperties, PersistencePropertyChecker, VersionRecord};
pub use queue::{QueueProperties, QueuePropertyChecker};
pub use stack::{StackProperties, StackPropertyChecker};
