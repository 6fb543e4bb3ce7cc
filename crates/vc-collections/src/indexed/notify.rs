//! Change notification: per-item property signals and collection events.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`PropertyChangedSignal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Signal an item raises after one of its properties changed.
///
/// Items opt in by embedding a signal and calling [`notify`] with the
/// property name after every mutation of an indexed property. An
/// [`IndexedCollection`] subscribes while the item is a member and moves it
/// to the right bucket when notified.
///
/// [`notify`]: PropertyChangedSignal::notify
/// [`IndexedCollection`]: super::IndexedCollection
#[derive(Default)]
pub struct PropertyChangedSignal {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler)>>,
}

impl PropertyChangedSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Calls every handler with `property`. Handlers run outside the
    /// signal's own lock, so they may subscribe or unsubscribe.
    pub fn notify(&self, property: &str) {
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(property);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl fmt::Debug for PropertyChangedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyChangedSignal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`IndexedCollection::observe`](super::IndexedCollection::observe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// A change to a collection's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    Added { item: T, position: usize },
    Removed { item: T, position: usize },
    Replaced { old: T, new: T, position: usize },
    /// The collection was cleared.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let signal = PropertyChangedSignal::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let id = signal.subscribe(move |property| {
            assert_eq!(property, "owner");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(signal.subscriber_count(), 1);

        signal.notify("owner");
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.notify("owner");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let signal = Arc::new(PropertyChangedSignal::new());
        let inner = Arc::clone(&signal);
        let slot = Arc::new(Mutex::new(None));
        let slot_in = Arc::clone(&slot);
        let id = signal.subscribe(move |_| {
            if let Some(id) = *slot_in.lock() {
                inner.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        signal.notify("x");
        assert_eq!(signal.subscriber_count(), 0);
    }
}
