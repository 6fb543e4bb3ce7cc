//! Declaring indexes and notification before a collection is built.

use std::sync::Arc;

use super::index::{Accessor, IndexKey, ItemComparer, DEFAULT_MAX_BUCKET_COUNT};
use super::notify::PropertyChangedSignal;
use super::{IndexedCollection, SignalSource};
use crate::error::{CollectionError, Result};

/// Builder for [`IndexedCollection`].
///
/// ```
/// use vc_collections::indexed::{IndexKey, IndexedCollection};
///
/// let tiles = IndexedCollection::builder()
///     .index("row", |tile: &(u32, u32)| Some(IndexKey::from(tile.0)))
///     .contents([(0, 0), (0, 1), (1, 0)])
///     .build()
///     .unwrap();
///
/// assert_eq!(tiles.find_by("row", &IndexKey::from(0u32)).unwrap().len(), 2);
/// ```
pub struct IndexedCollectionBuilder<T> {
    comparer: Arc<dyn ItemComparer<T>>,
    max_bucket_count: usize,
    indexes: Vec<(String, Accessor<T>)>,
    signal_source: Option<SignalSource<T>>,
    contents: Vec<T>,
}

impl<T> IndexedCollectionBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(comparer: Arc<dyn ItemComparer<T>>) -> Self {
        Self {
            comparer,
            max_bucket_count: DEFAULT_MAX_BUCKET_COUNT,
            indexes: Vec::new(),
            signal_source: None,
            contents: Vec::new(),
        }
    }

    /// Upper bound on bucket ids per index. Use
    /// [`UNBOUNDED_BUCKET_COUNT`](super::UNBOUNDED_BUCKET_COUNT) to disable it.
    #[must_use]
    pub fn max_bucket_count(mut self, count: usize) -> Self {
        self.max_bucket_count = count;
        self
    }

    #[must_use]
    pub fn comparer<C>(mut self, comparer: C) -> Self
    where
        C: ItemComparer<T> + 'static,
    {
        self.comparer = Arc::new(comparer);
        self
    }

    /// Declares an index. `accessor` returns `None` for items that have no
    /// value for the property; those items are left out of the index.
    #[must_use]
    pub fn index<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> Option<IndexKey> + Send + Sync + 'static,
    {
        self.indexes.push((name.into(), Arc::new(accessor)));
        self
    }

    /// Declares where an item keeps its [`PropertyChangedSignal`], if it has
    /// one. The collection subscribes to it while the item is a member.
    #[must_use]
    pub fn change_notification<F>(mut self, source: F) -> Self
    where
        F: for<'a> Fn(&'a T) -> Option<&'a PropertyChangedSignal> + Send + Sync + 'static,
    {
        self.signal_source = Some(Arc::new(source));
        self
    }

    /// Initial items. Duplicates are skipped.
    #[must_use]
    pub fn contents<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        self.contents.extend(items);
        self
    }

    pub fn build(self) -> Result<IndexedCollection<T>> {
        if self.max_bucket_count == 0 {
            return Err(CollectionError::InvalidArgument(
                "max_bucket_count must be at least 1".to_string(),
            ));
        }
        for (at, (name, _)) in self.indexes.iter().enumerate() {
            if name.is_empty() {
                return Err(CollectionError::InvalidArgument(
                    "index name must not be empty".to_string(),
                ));
            }
            if self.indexes[..at].iter().any(|(other, _)| other == name) {
                return Err(CollectionError::InvalidArgument(format!(
                    "index {:?} declared twice",
                    name
                )));
            }
        }

        let collection = IndexedCollection::from_parts(
            self.comparer,
            self.max_bucket_count,
            self.indexes,
            self.signal_source,
        );
        collection.add_many(self.contents);
        Ok(collection)
    }
}
