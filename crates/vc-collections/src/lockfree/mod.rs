//! Non-blocking stack and queue.
//!
//! Both structures retry failed CAS operations with [`Backoff`] and retire
//! unlinked nodes through `crossbeam-epoch`, so a node is never freed while
//! another thread may still be reading it.

pub mod backoff;
pub mod queue;
pub mod stack;

pub use backoff::Backoff;
pub use queue::LockFreeQueue;
pub use stack::LockFreeStack;
