//! # vc-collections
//!
//! Collections behind the game's data layer.
//!
//! - [`indexed`]: `IndexedCollection`, a mutable collection with
//!   hash-partitioned secondary indexes under an upgradable reader-writer
//!   lock
//! - [`lockfree`]: Treiber stack and Michael–Scott queue with epoch-based
//!   reclamation
//! - [`persistent`]: immutable AVL tree, stack, deque and queue with
//!   structural sharing
//!
//! Each structure is checked against the matching property checker from
//! `vc-core`. The lock-free pair also runs under the DST fault injector
//! from `vc-dst` (both implement `DstTestableContainer`), under loom (see
//! [`loom_models`]) and under Kani (see `kani_proofs`).
//!
//! The library installs no `tracing` subscriber.

pub mod error;
pub mod indexed;
mod kani_proofs;
pub mod lockfree;
pub mod loom_models;
pub mod persistent;

pub use error::{CollectionError, Result};
pub use indexed::{CollectionChange, IndexKey, IndexedCollection, ItemComparer, PropertyChangedSignal};
pub use lockfree::{LockFreeQueue, LockFreeStack};
pub use loom_models::{LoomQueue, LoomStack};
pub use persistent::{PersistentAvlTree, PersistentDeque, PersistentQueue, PersistentStack};
