//! Immutable structures with structural sharing.
//!
//! No value in this module is ever changed after construction: every
//! update returns a new version, and old versions stay valid. All types
//! are `Send + Sync` when their contents are, so versions can be read from
//! any thread. Swapping which version a shared variable points to needs an
//! external atomic reference.

pub mod avl;
pub mod deque;
pub mod queue;
pub mod stack;

pub use avl::PersistentAvlTree;
pub use deque::PersistentDeque;
pub use queue::PersistentQueue;
pub use stack::PersistentStack;
