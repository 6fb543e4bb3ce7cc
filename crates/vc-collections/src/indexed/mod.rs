//! Collection with hash-partitioned secondary indexes.
//!
//! # Lock protocol
//!
//! Every mutation takes an upgradable read lock, checks whether it has
//! anything to do, and only then upgrades to the write lock. After the
//! change it downgrades to a plain read lock and raises collection events
//! while readers proceed and no writer can interleave:
//!
//! ```text
//! Unlocked -> UpgradableRead -> (Write) -> Read -> Unlocked
//! ```
//!
//! Only one upgradable reader exists at a time, so two would-be writers
//! never deadlock on upgrade.
//!
//! # Limitations
//!
//! Observers run under the read lock and must not call back into the
//! collection at all: parking_lot read locks are not recursive, so even a
//! nested `contains` can deadlock behind a queued writer.
//!
//! An item whose indexed value changes without a notification (no change
//! signal, or notification switched off) sits in a stale bucket until
//! [`IndexedCollection::rebuild_indexes`]. `contains` and the `*_by`
//! queries may miss it meanwhile; `add`, `insert`, `remove` and
//! `index_of` fall back to the backing sequence and still see it.
//! An iterator also holds the read lock: changing an indexed property of a
//! member item (which makes the collection relocate it) on the iterating
//! thread deadlocks.

mod builder;
mod index;
mod notify;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use tracing::debug;

pub use builder::IndexedCollectionBuilder;
pub use index::{
    DefaultComparer, IndexKey, ItemComparer, DEFAULT_MAX_BUCKET_COUNT, UNBOUNDED_BUCKET_COUNT,
};
pub use notify::{CollectionChange, ObserverId, PropertyChangedSignal, SubscriptionId};

use index::{bucket_id, Accessor, Index};
use crate::error::{CollectionError, Result};

pub(crate) type SignalSource<T> =
    Arc<dyn for<'a> Fn(&'a T) -> Option<&'a PropertyChangedSignal> + Send + Sync>;

type Observer<T> = Arc<dyn Fn(&CollectionChange<T>) + Send + Sync>;

/// A mutable collection with secondary indexes, safe under many readers
/// and one writer.
///
/// Items are compared with the collection's [`ItemComparer`]. Each index
/// is declared on the builder with an accessor; an item whose accessor
/// returns a value sits in exactly one bucket of that index.
pub struct IndexedCollection<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: RwLock<State<T>>,
    comparer: Arc<dyn ItemComparer<T>>,
    signal_source: Option<SignalSource<T>>,
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
    next_observer: AtomicU64,
    max_bucket_count: usize,
    this: Weak<Shared<T>>,
}

struct State<T> {
    items: Vec<T>,
    // Aligned with `items`.
    subscriptions: Vec<Option<SubscriptionId>>,
    indexes: Vec<Index<T>>,
    notification_enabled: bool,
}

impl<T: Clone> State<T> {
    fn index(&self, name: &str) -> Result<&Index<T>> {
        self.indexes
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| CollectionError::InvalidArgument(format!("no index named {:?}", name)))
    }

    fn position_of(&self, item: &T, comparer: &dyn ItemComparer<T>) -> Option<usize> {
        self.items.iter().position(|x| comparer.equals(x, item))
    }

    /// Consults every index that has a value for `item`. Any hit wins; if
    /// at least one was consulted and all missed, the item is absent.
    /// Without a usable index the backing sequence is scanned.
    fn contains(&self, item: &T, max_bucket_count: usize, comparer: &dyn ItemComparer<T>) -> bool {
        let mut consulted = false;
        for index in &self.indexes {
            match index.contains(item, max_bucket_count, comparer) {
                Some(true) => return true,
                Some(false) => consulted = true,
                None => {}
            }
        }
        !consulted && self.position_of(item, comparer).is_some()
    }
}

impl<T> IndexedCollection<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Builder using `Eq` and `Hash` to compare items.
    #[must_use]
    pub fn builder() -> IndexedCollectionBuilder<T> {
        IndexedCollectionBuilder::new(Arc::new(DefaultComparer))
    }

    /// An empty collection without indexes.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(Arc::new(DefaultComparer), DEFAULT_MAX_BUCKET_COUNT, Vec::new(), None)
    }
}

impl<T> Default for IndexedCollection<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexedCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn builder_with_comparer<C>(comparer: C) -> IndexedCollectionBuilder<T>
    where
        C: ItemComparer<T> + 'static,
    {
        IndexedCollectionBuilder::new(Arc::new(comparer))
    }

    pub(crate) fn from_parts(
        comparer: Arc<dyn ItemComparer<T>>,
        max_bucket_count: usize,
        indexes: Vec<(String, Accessor<T>)>,
        signal_source: Option<SignalSource<T>>,
    ) -> Self {
        let indexes = indexes
            .into_iter()
            .map(|(name, accessor)| Index::new(name, accessor))
            .collect();
        let notification_enabled = signal_source.is_some();
        let shared = Arc::new_cyclic(|this| Shared {
            state: RwLock::new(State {
                items: Vec::new(),
                subscriptions: Vec::new(),
                indexes,
                notification_enabled,
            }),
            comparer,
            signal_source,
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            max_bucket_count,
            this: this.clone(),
        });
        Self { shared }
    }

    /// Appends `item` unless an equal item is present. Returns whether it
    /// was added.
    pub fn add(&self, item: T) -> bool {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        if shared.holds_locked(&state, &item) {
            return false;
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let position = state.items.len();
        shared.insert_locked(&mut state, position, item.clone());
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Added { item, position });
        true
    }

    /// Inserts `item` at `position` unless an equal item is present.
    pub fn insert(&self, position: usize, item: T) -> Result<bool> {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        if position > state.items.len() {
            return Err(CollectionError::IndexOutOfRange {
                index: position,
                len: state.items.len(),
            });
        }
        if shared.holds_locked(&state, &item) {
            return Ok(false);
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        shared.insert_locked(&mut state, position, item.clone());
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Added { item, position });
        Ok(true)
    }

    /// Removes the item equal to `item`. Returns whether one was removed.
    pub fn remove(&self, item: &T) -> bool {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        let Some(position) = shared.index_of_locked(&state, item) else {
            return false;
        };
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let removed = shared.remove_locked(&mut state, position);
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Removed {
            item: removed,
            position,
        });
        true
    }

    pub fn remove_at(&self, position: usize) -> Result<T> {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        check_position(position, state.items.len())?;
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let removed = shared.remove_locked(&mut state, position);
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Removed {
            item: removed.clone(),
            position,
        });
        Ok(removed)
    }

    /// Replaces the item at `position` and returns the old one. An item
    /// equal to one stored at another position is rejected.
    pub fn replace(&self, position: usize, item: T) -> Result<T> {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        check_position(position, state.items.len())?;
        if let Some(existing) = state.position_of(&item, &*shared.comparer) {
            if existing != position {
                return Err(CollectionError::InvalidArgument(format!(
                    "item already stored at position {}",
                    existing
                )));
            }
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let old = shared.remove_locked(&mut state, position);
        shared.insert_locked(&mut state, position, item.clone());
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Replaced {
            old: old.clone(),
            new: item,
            position,
        });
        Ok(old)
    }

    pub fn clear(&self) {
        let shared = &*self.shared;
        let mut state = shared.state.write();
        for (item, subscription) in state.items.iter().zip(state.subscriptions.iter()) {
            if let Some(id) = subscription {
                detach(shared.signal_source.as_ref(), item, *id);
            }
        }
        state.items.clear();
        state.subscriptions.clear();
        for index in &mut state.indexes {
            index.clear();
        }
        let _state = RwLockWriteGuard::downgrade(state);
        shared.raise(&CollectionChange::Reset);
    }

    /// Adds every item not already present. Returns how many were added.
    pub fn add_many<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        let pending: Vec<T> = items
            .into_iter()
            .filter(|item| !shared.holds_locked(&state, item))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let mut added = Vec::with_capacity(pending.len());
        for item in pending {
            // The batch itself may hold duplicates.
            if shared.holds_locked(&state, &item) {
                continue;
            }
            let position = state.items.len();
            shared.insert_locked(&mut state, position, item.clone());
            added.push(CollectionChange::Added { item, position });
        }
        let _state = RwLockWriteGuard::downgrade(state);
        for change in &added {
            shared.raise(change);
        }
        added.len()
    }

    /// Removes every item present. Returns how many were removed.
    pub fn remove_many<'a, I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        let pending: Vec<&T> = items
            .into_iter()
            .filter(|item| shared.index_of_locked(&state, item).is_some())
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let mut removed = Vec::with_capacity(pending.len());
        for item in pending {
            if let Some(position) = state.position_of(item, &*shared.comparer) {
                let item = shared.remove_locked(&mut state, position);
                removed.push(CollectionChange::Removed { item, position });
            }
        }
        let _state = RwLockWriteGuard::downgrade(state);
        for change in &removed {
            shared.raise(change);
        }
        removed.len()
    }

    /// Index-accelerated; a member sitting in a stale bucket may be
    /// reported absent until the indexes are rebuilt.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        let state = self.shared.state.read();
        self.shared.contains_locked(&state, item)
    }

    /// Position in the backing sequence, found by a linear scan so that
    /// members in stale buckets are still found.
    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        let state = self.shared.state.read();
        self.shared.index_of_locked(&state, item)
    }

    pub fn get(&self, position: usize) -> Result<T> {
        let state = self.shared.state.read();
        check_position(position, state.items.len())?;
        Ok(state.items[position].clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.read().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.state.read().items.is_empty()
    }

    /// Copy of the backing sequence.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.shared.state.read().items.clone()
    }

    /// Iterates over clones of the items. The read lock is held until the
    /// iterator is dropped; writers block meanwhile.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            state: self.shared.state.read(),
            position: 0,
        }
    }

    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.shared.state.read().index(name).is_ok()
    }

    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.shared
            .state
            .read()
            .indexes
            .iter()
            .map(|index| index.name().to_string())
            .collect()
    }

    #[must_use]
    pub fn max_bucket_count(&self) -> usize {
        self.shared.max_bucket_count
    }

    /// Bucket id `key` maps to in every index of this collection.
    #[must_use]
    pub fn bucket_of(&self, key: &IndexKey) -> u64 {
        bucket_id(key, self.shared.max_bucket_count)
    }

    /// Items whose `name` property equals `key`, in no particular order.
    pub fn find_by(&self, name: &str, key: &IndexKey) -> Result<Vec<T>> {
        let state = self.shared.state.read();
        Ok(state.index(name)?.find(key, self.shared.max_bucket_count))
    }

    /// One item whose `name` property equals `key`.
    pub fn first_by(&self, name: &str, key: &IndexKey) -> Result<T> {
        self.find_by(name, key)?
            .into_iter()
            .next()
            .ok_or_else(|| CollectionError::KeyNotFound(format!("{} = {}", name, key)))
    }

    /// Items grouped by their `name` property, keys ascending. Items with
    /// no value are left out.
    pub fn group_by(&self, name: &str) -> Result<Vec<(IndexKey, Vec<T>)>> {
        let state = self.shared.state.read();
        let index = state.index(name)?;
        let mut groups: BTreeMap<IndexKey, Vec<T>> = BTreeMap::new();
        for bucket in index.buckets().values() {
            for item in bucket.iter() {
                if let Some(key) = index.key_of(item) {
                    groups.entry(key).or_default().push(item.clone());
                }
            }
        }
        Ok(groups.into_iter().collect())
    }

    /// Bucket contents of index `name`, sorted by bucket id.
    pub fn buckets(&self, name: &str) -> Result<Vec<(u64, Vec<T>)>> {
        let state = self.shared.state.read();
        let mut buckets: Vec<(u64, Vec<T>)> = state
            .index(name)?
            .buckets()
            .iter()
            .map(|(id, bucket)| {
                let mut items = Vec::with_capacity(bucket.len());
                items.extend(bucket.iter().cloned());
                (*id, items)
            })
            .collect();
        buckets.sort_unstable_by_key(|(id, _)| *id);
        Ok(buckets)
    }

    /// Moves `item` to the bucket matching its current `property` value.
    ///
    /// Called by the item's change signal; call it directly for items
    /// without one. Unknown properties and non-members are ignored.
    pub fn on_item_property_changed(&self, item: &T, property: &str) {
        self.shared.on_item_property_changed(item, property);
    }

    #[must_use]
    pub fn is_change_notification_enabled(&self) -> bool {
        self.shared.state.read().notification_enabled
    }

    /// Subscribes to (or unsubscribes from) every member's change signal.
    pub fn set_change_notification_enabled(&self, enabled: bool) {
        let shared = &*self.shared;
        let state = shared.state.upgradable_read();
        if state.notification_enabled == enabled {
            return;
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        state.notification_enabled = enabled;
        let State {
            items,
            subscriptions,
            ..
        } = &mut *state;
        for (item, subscription) in items.iter().zip(subscriptions.iter_mut()) {
            if enabled {
                *subscription = shared.attach(item);
            } else if let Some(id) = subscription.take() {
                detach(shared.signal_source.as_ref(), item, id);
            }
        }
        debug!(enabled, items = items.len(), "change notification toggled");
    }

    /// Recomputes every bucket from the backing sequence.
    pub fn rebuild_indexes(&self) {
        let shared = &*self.shared;
        let mut state = shared.state.write();
        let State { items, indexes, .. } = &mut *state;
        for index in indexes.iter_mut() {
            index.clear();
            for item in items.iter() {
                index.insert(item, shared.max_bucket_count, &*shared.comparer);
            }
        }
        debug!(items = items.len(), indexes = indexes.len(), "indexes rebuilt");
    }

    /// Registers a callback for every collection change. Callbacks run
    /// under the collection's read lock and must not call any method of
    /// the collection.
    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer.fetch_add(1, Ordering::Relaxed));
        self.shared.observers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn contains_locked(&self, state: &State<T>, item: &T) -> bool {
        state.contains(item, self.max_bucket_count, &*self.comparer)
    }

    /// Membership for mutations. An index miss is confirmed against the
    /// backing sequence: a member whose indexed value changed without a
    /// notification sits in a stale bucket.
    fn holds_locked(&self, state: &State<T>, item: &T) -> bool {
        self.contains_locked(state, item) || state.position_of(item, &*self.comparer).is_some()
    }

    fn index_of_locked(&self, state: &State<T>, item: &T) -> Option<usize> {
        state.position_of(item, &*self.comparer)
    }

    fn insert_locked(&self, state: &mut State<T>, position: usize, item: T) {
        for index in &mut state.indexes {
            index.insert(&item, self.max_bucket_count, &*self.comparer);
        }
        let subscription = if state.notification_enabled {
            self.attach(&item)
        } else {
            None
        };
        state.items.insert(position, item);
        state.subscriptions.insert(position, subscription);
    }

    fn remove_locked(&self, state: &mut State<T>, position: usize) -> T {
        let item = state.items.remove(position);
        if let Some(id) = state.subscriptions.remove(position) {
            detach(self.signal_source.as_ref(), &item, id);
        }
        for index in &mut state.indexes {
            index.remove(&item, self.max_bucket_count, &*self.comparer);
        }
        item
    }

    fn attach(&self, item: &T) -> Option<SubscriptionId> {
        let signal = (self.signal_source.as_ref()?)(item)?;
        let this = self.this.clone();
        let member = item.clone();
        Some(signal.subscribe(move |property| {
            if let Some(shared) = this.upgrade() {
                shared.on_item_property_changed(&member, property);
            }
        }))
    }

    fn on_item_property_changed(&self, item: &T, property: &str) {
        let state = self.state.upgradable_read();
        let Some(slot) = state.indexes.iter().position(|index| index.name() == property) else {
            return;
        };
        let Some(position) = state.position_of(item, &*self.comparer) else {
            return;
        };
        let comparer = &*self.comparer;
        if !state.indexes[slot].is_misplaced(&state.items[position], self.max_bucket_count, comparer) {
            return;
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let State { items, indexes, .. } = &mut *state;
        indexes[slot].relocate(&items[position], self.max_bucket_count, comparer);
        debug!(index = property, position, "relocated item after property change");
    }

    fn raise(&self, change: &CollectionChange<T>) {
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(change);
        }
    }
}

impl<T> Drop for Shared<T> {
    // Subscription handlers hold clones of their items, which for
    // reference-counted items keeps each item alive through its own signal.
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (item, subscription) in state.items.iter().zip(state.subscriptions.iter_mut()) {
            if let Some(id) = subscription.take() {
                detach(self.signal_source.as_ref(), item, id);
            }
        }
    }
}

fn detach<T>(source: Option<&SignalSource<T>>, item: &T, id: SubscriptionId) {
    if let Some(signal) = source.and_then(|source| source(item)) {
        signal.unsubscribe(id);
    }
}

fn check_position(position: usize, len: usize) -> Result<()> {
    if position >= len {
        return Err(CollectionError::IndexOutOfRange {
            index: position,
            len,
        });
    }
    Ok(())
}

impl<T> fmt::Debug for IndexedCollection<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("IndexedCollection")
            .field("items", &state.items)
            .field("indexes", &state.indexes.iter().map(Index::name).collect::<Vec<_>>())
            .field("max_bucket_count", &self.shared.max_bucket_count)
            .finish()
    }
}

/// Iterator over item clones; holds the collection's read lock.
pub struct Iter<'a, T> {
    state: RwLockReadGuard<'a, State<T>>,
    position: usize,
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.state.items.get(self.position)?.clone();
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.state.items.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl<T: Clone> ExactSizeIterator for Iter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[derive(Debug)]
    struct Unit {
        id: u32,
        owner: PlMutex<Option<u32>>,
        changed: PropertyChangedSignal,
    }

    impl Unit {
        fn new(id: u32, owner: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                id,
                owner: PlMutex::new(owner),
                changed: PropertyChangedSignal::new(),
            })
        }

        fn set_owner(&self, owner: Option<u32>) {
            *self.owner.lock() = owner;
            self.changed.notify("owner");
        }
    }

    struct ById;

    impl ItemComparer<Arc<Unit>> for ById {
        fn equals(&self, a: &Arc<Unit>, b: &Arc<Unit>) -> bool {
            a.id == b.id
        }

        fn hash(&self, item: &Arc<Unit>) -> u64 {
            u64::from(item.id)
        }
    }

    fn units() -> IndexedCollection<Arc<Unit>> {
        IndexedCollection::builder_with_comparer(ById)
            .index("owner", |u: &Arc<Unit>| (*u.owner.lock()).map(IndexKey::from))
            .change_notification(|u: &Arc<Unit>| Some(&u.changed))
            .build()
            .unwrap()
    }

    #[test]
    fn test_add_contains_remove() {
        let collection = IndexedCollection::builder()
            .index("parity", |v: &u32| Some(IndexKey::from(v % 2)))
            .build()
            .unwrap();

        assert!(collection.add(4));
        assert!(collection.add(7));
        assert!(!collection.add(4));
        assert!(collection.contains(&7));
        assert!(!collection.contains(&9));
        assert_eq!(collection.index_of(&7), Some(1));
        assert!(collection.remove(&4));
        assert!(!collection.remove(&4));
        assert_eq!(collection.to_vec(), vec![7]);
    }

    #[test]
    fn test_positional_operations() {
        let collection: IndexedCollection<u32> = IndexedCollection::new();
        collection.add_many([1, 2, 3]);

        assert_eq!(collection.insert(0, 0), Ok(true));
        assert_eq!(collection.insert(9, 5), Err(CollectionError::IndexOutOfRange { index: 9, len: 4 }));
        assert_eq!(collection.get(0), Ok(0));
        assert_eq!(collection.remove_at(1), Ok(1));
        assert_eq!(collection.replace(0, 10), Ok(0));
        assert!(matches!(collection.replace(0, 3), Err(CollectionError::InvalidArgument(_))));
        assert_eq!(collection.replace(2, 3), Ok(3));
        assert_eq!(collection.to_vec(), vec![10, 2, 3]);
        assert!(collection.remove_at(3).is_err());
        assert!(collection.get(3).is_err());
    }

    #[test]
    fn test_relocation_on_property_change() {
        let collection = units();
        let unit = Unit::new(1, Some(10));
        collection.add(Arc::clone(&unit));
        assert_eq!(unit.changed.subscriber_count(), 1);

        unit.set_owner(Some(20));
        assert!(collection.find_by("owner", &IndexKey::from(10u32)).unwrap().is_empty());
        assert_eq!(collection.first_by("owner", &IndexKey::from(20u32)).unwrap().id, 1);

        unit.set_owner(None);
        assert!(collection.buckets("owner").unwrap().is_empty());
        assert!(collection.contains(&unit));
    }

    #[test]
    fn test_remove_unsubscribes() {
        let collection = units();
        let unit = Unit::new(1, Some(1));
        collection.add(Arc::clone(&unit));
        assert!(collection.remove(&unit));
        assert_eq!(unit.changed.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_releases_items() {
        let unit = Unit::new(1, Some(1));
        {
            let collection = units();
            collection.add(Arc::clone(&unit));
        }
        assert_eq!(unit.changed.subscriber_count(), 0);
        assert_eq!(Arc::strong_count(&unit), 1);
    }

    #[test]
    fn test_member_in_stale_bucket() {
        let collection = IndexedCollection::builder_with_comparer(ById)
            .index("owner", |u: &Arc<Unit>| (*u.owner.lock()).map(IndexKey::from))
            .build()
            .unwrap();
        let unit = Unit::new(1, Some(10));
        assert!(collection.add(Arc::clone(&unit)));

        // No change signal is declared, so the index keeps bucket 10.
        *unit.owner.lock() = Some(11);
        assert!(!collection.add(Arc::clone(&unit)));
        assert!(!collection.insert(0, Arc::clone(&unit)).unwrap());
        assert_eq!(collection.add_many([Arc::clone(&unit)]), 0);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.index_of(&unit), Some(0));

        assert!(collection.remove(&unit));
        assert!(collection.is_empty());
        assert!(collection.buckets("owner").unwrap().is_empty());
    }

    #[test]
    fn test_toggle_notification() {
        let collection = units();
        let unit = Unit::new(1, Some(1));
        collection.add(Arc::clone(&unit));

        collection.set_change_notification_enabled(false);
        assert!(!collection.is_change_notification_enabled());
        assert_eq!(unit.changed.subscriber_count(), 0);

        // Without notification the index goes stale until rebuilt.
        unit.set_owner(Some(2));
        let stale = collection.buckets("owner").unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, collection.bucket_of(&IndexKey::from(1u32)));

        collection.rebuild_indexes();
        let fresh = collection.buckets("owner").unwrap();
        assert_eq!(fresh[0].0, collection.bucket_of(&IndexKey::from(2u32)));
        assert_eq!(collection.find_by("owner", &IndexKey::from(2u32)).unwrap().len(), 1);

        collection.set_change_notification_enabled(true);
        assert_eq!(unit.changed.subscriber_count(), 1);
    }

    #[test]
    fn test_observers() {
        let collection: IndexedCollection<u32> = IndexedCollection::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = collection.observe(move |change| sink.lock().push(change.clone()));

        collection.add(1);
        collection.replace(0, 2).unwrap();
        collection.remove(&2);
        collection.clear();
        assert!(collection.unobserve(id));
        collection.add(3);

        assert_eq!(
            *seen.lock(),
            vec![
                CollectionChange::Added { item: 1, position: 0 },
                CollectionChange::Replaced { old: 1, new: 2, position: 0 },
                CollectionChange::Removed { item: 2, position: 0 },
                CollectionChange::Reset,
            ]
        );
    }

    #[test]
    fn test_group_by_and_unknown_index() {
        let collection = IndexedCollection::builder()
            .index("tens", |v: &u32| Some(IndexKey::from(v / 10)))
            .contents([1, 12, 15, 3, 27])
            .build()
            .unwrap();

        let groups = collection.group_by("tens").unwrap();
        let keys: Vec<_> = groups.iter().map(|(key, items)| (key.clone(), items.len())).collect();
        assert_eq!(
            keys,
            vec![(IndexKey::from(0u32), 2), (IndexKey::from(1u32), 2), (IndexKey::from(2u32), 1)]
        );
        assert!(collection.has_index("tens"));
        assert!(matches!(collection.find_by("ones", &IndexKey::from(1u32)), Err(CollectionError::InvalidArgument(_))));
        assert!(matches!(collection.first_by("tens", &IndexKey::from(9u32)), Err(CollectionError::KeyNotFound(_))));
    }

    #[test]
    fn test_iter_holds_snapshot_order() {
        let collection: IndexedCollection<u32> = IndexedCollection::new();
        collection.add_many(0..5);
        let items: Vec<u32> = collection.iter().collect();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(collection.iter().len(), 5);
    }
}
