//! Secondary indexes: keys, comparers, buckets.
//!
//! An index maps a bucket id, `hash(key) % max_bucket_count`, to the items
//! whose key hashes there. With a bounded bucket count, unrelated keys
//! share buckets, so every lookup still checks the key (or the item) after
//! the bucket has pruned the candidates.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};
use tracing::warn;

/// Bucket limit used when the builder does not set one.
pub const DEFAULT_MAX_BUCKET_COUNT: usize = 32;

/// Disables the modulo: every distinct key hash gets its own bucket.
pub const UNBOUNDED_BUCKET_COUNT: usize = usize::MAX;

/// Value of an indexed property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Int(i64),
    UInt(u64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(v) => write!(f, "{}", v),
            IndexKey::UInt(v) => write!(f, "{}", v),
            IndexKey::Str(v) => write!(f, "{:?}", v),
            IndexKey::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::Int(v)
    }
}

impl From<i32> for IndexKey {
    fn from(v: i32) -> Self {
        IndexKey::Int(i64::from(v))
    }
}

impl From<u64> for IndexKey {
    fn from(v: u64) -> Self {
        IndexKey::UInt(v)
    }
}

impl From<u32> for IndexKey {
    fn from(v: u32) -> Self {
        IndexKey::UInt(u64::from(v))
    }
}

impl From<bool> for IndexKey {
    fn from(v: bool) -> Self {
        IndexKey::Bool(v)
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        IndexKey::Str(v)
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::Str(v.to_owned())
    }
}

/// Equality and hashing for items.
///
/// `hash` must agree with `equals`, and must not depend on any indexed
/// property that can change while the item is in a collection.
pub trait ItemComparer<T>: Send + Sync {
    fn equals(&self, a: &T, b: &T) -> bool;

    fn hash(&self, item: &T) -> u64;
}

/// Comparer for `Eq + Hash` items.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultComparer;

impl<T: Eq + Hash> ItemComparer<T> for DefaultComparer {
    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }

    fn hash(&self, item: &T) -> u64 {
        fx_hash(item)
    }
}

pub(crate) fn fx_hash<H: Hash + ?Sized>(value: &H) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn bucket_id(key: &IndexKey, max_bucket_count: usize) -> u64 {
    let hash = fx_hash(key);
    if max_bucket_count == UNBOUNDED_BUCKET_COUNT {
        hash
    } else {
        hash % max_bucket_count as u64
    }
}

pub(crate) type Accessor<T> = Arc<dyn Fn(&T) -> Option<IndexKey> + Send + Sync>;

/// Items sharing one bucket id, grouped by item hash.
pub(crate) struct Bucket<T> {
    by_hash: FxHashMap<u64, Vec<T>>,
    len: usize,
}

impl<T> Bucket<T> {
    fn new() -> Self {
        Self {
            by_hash: FxHashMap::default(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.by_hash.values().flatten()
    }

    fn contains(&self, item: &T, comparer: &dyn ItemComparer<T>) -> bool {
        self.by_hash
            .get(&comparer.hash(item))
            .is_some_and(|slot| slot.iter().any(|x| comparer.equals(x, item)))
    }

    fn insert(&mut self, item: T, comparer: &dyn ItemComparer<T>) -> bool {
        let slot = self.by_hash.entry(comparer.hash(&item)).or_default();
        if slot.iter().any(|x| comparer.equals(x, &item)) {
            return false;
        }
        slot.push(item);
        self.len += 1;
        true
    }

    fn remove(&mut self, item: &T, comparer: &dyn ItemComparer<T>) -> bool {
        let hash = comparer.hash(item);
        let Some(slot) = self.by_hash.get_mut(&hash) else {
            return false;
        };
        let Some(at) = slot.iter().position(|x| comparer.equals(x, item)) else {
            return false;
        };
        slot.swap_remove(at);
        if slot.is_empty() {
            self.by_hash.remove(&hash);
        }
        self.len -= 1;
        true
    }
}

/// One declared index.
pub(crate) struct Index<T> {
    name: String,
    accessor: Accessor<T>,
    buckets: FxHashMap<u64, Bucket<T>>,
}

impl<T: Clone> Index<T> {
    pub(crate) fn new(name: String, accessor: Accessor<T>) -> Self {
        Self {
            name,
            accessor,
            buckets: FxHashMap::default(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn key_of(&self, item: &T) -> Option<IndexKey> {
        (self.accessor)(item)
    }

    pub(crate) fn buckets(&self) -> &FxHashMap<u64, Bucket<T>> {
        &self.buckets
    }

    fn target(&self, item: &T, max_bucket_count: usize) -> Option<u64> {
        self.key_of(item)
            .map(|key| bucket_id(&key, max_bucket_count))
    }

    /// `None` when the item's value is absent and the index cannot answer.
    pub(crate) fn contains(
        &self,
        item: &T,
        max_bucket_count: usize,
        comparer: &dyn ItemComparer<T>,
    ) -> Option<bool> {
        let id = self.target(item, max_bucket_count)?;
        Some(
            self.buckets
                .get(&id)
                .is_some_and(|bucket| bucket.contains(item, comparer)),
        )
    }

    pub(crate) fn insert(&mut self, item: &T, max_bucket_count: usize, comparer: &dyn ItemComparer<T>) {
        if let Some(id) = self.target(item, max_bucket_count) {
            self.buckets
                .entry(id)
                .or_insert_with(Bucket::new)
                .insert(item.clone(), comparer);
        }
    }

    /// Removes `item` from its computed bucket. If the item is not there
    /// (its value changed without a notification) every bucket is swept.
    pub(crate) fn remove(&mut self, item: &T, max_bucket_count: usize, comparer: &dyn ItemComparer<T>) -> bool {
        if let Some(id) = self.target(item, max_bucket_count) {
            if let Some(bucket) = self.buckets.get_mut(&id) {
                if bucket.remove(item, comparer) {
                    if bucket.is_empty() {
                        self.buckets.remove(&id);
                    }
                    return true;
                }
            }
        }

        let mut found = false;
        self.buckets.retain(|_, bucket| {
            found |= bucket.remove(item, comparer);
            !bucket.is_empty()
        });
        if found {
            warn!(index = %self.name, "removed a stale entry outside the item's computed bucket");
        }
        found
    }

    /// True when the item sits anywhere other than exactly its computed
    /// bucket.
    pub(crate) fn is_misplaced(&self, item: &T, max_bucket_count: usize, comparer: &dyn ItemComparer<T>) -> bool {
        let target = self.target(item, max_bucket_count);
        let in_target = target
            .and_then(|id| self.buckets.get(&id))
            .is_some_and(|bucket| bucket.contains(item, comparer));
        if target.is_some() && !in_target {
            return true;
        }
        self.buckets
            .iter()
            .any(|(id, bucket)| Some(*id) != target && bucket.contains(item, comparer))
    }

    /// Moves `item` into the bucket for its current value and drops it from
    /// every other bucket. Buckets left empty are removed.
    pub(crate) fn relocate(&mut self, item: &T, max_bucket_count: usize, comparer: &dyn ItemComparer<T>) {
        let target = self.target(item, max_bucket_count);
        self.buckets.retain(|id, bucket| {
            if Some(*id) != target {
                bucket.remove(item, comparer);
            }
            !bucket.is_empty()
        });
        if let Some(id) = target {
            self.buckets
                .entry(id)
                .or_insert_with(Bucket::new)
                .insert(item.clone(), comparer);
        }
    }

    /// Items whose current value equals `key`.
    pub(crate) fn find(&self, key: &IndexKey, max_bucket_count: usize) -> Vec<T> {
        let Some(bucket) = self.buckets.get(&bucket_id(key, max_bucket_count)) else {
            return Vec::new();
        };
        bucket
            .iter()
            .filter(|item| self.key_of(item).as_ref() == Some(key))
            .cloned()
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }
}
