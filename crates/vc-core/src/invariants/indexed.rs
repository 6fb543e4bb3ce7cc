//! Indexed collection invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoDuplicateItems | The backing sequence holds each item once |
//! | IndexCoverage | An item with a value sits in exactly its computed bucket |
//! | NullValuesUnindexed | An item whose value is absent sits in no bucket |
//! | NoStaleEntries | Every bucket entry is a current item |
//! | NoEmptyBuckets | Empty buckets are removed |
//! | BucketIdsInRange | Bucket ids stay below the bucket limit |

use std::collections::{HashMap, HashSet};

use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "indexed_collection";

/// State of one secondary index, with items identified by `u64` ids.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub name: String,
    /// `None` when bucket ids are not reduced modulo a limit.
    pub max_bucket_count: Option<u64>,
    /// Bucket id and the items it holds.
    pub buckets: Vec<(u64, Vec<u64>)>,
    /// Bucket each current item should be in, computed from its current
    /// property value; `None` for an absent value.
    pub expected_buckets: Vec<(u64, Option<u64>)>,
}

pub trait IndexedCollectionProperties {
    /// Item ids in backing-sequence order.
    fn items(&self) -> Vec<u64>;

    fn indexes(&self) -> Vec<IndexSnapshot>;
}

pub struct IndexedCollectionPropertyChecker<'a, T: IndexedCollectionProperties> {
    collection: &'a T,
}

impl<'a, T: IndexedCollectionProperties> IndexedCollectionPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(collection: &'a T) -> Self {
        Self { collection }
    }

    fn check_no_duplicate_items(&self) -> PropertyResult {
        let items = self.collection.items();
        let mut seen = HashSet::with_capacity(items.len());
        match items.iter().find(|id| !seen.insert(**id)) {
            Some(id) => PropertyResult::fail(
                "NoDuplicateItems",
                STRUCTURE,
                format!("item {} appears more than once", id),
                None,
            ),
            None => PropertyResult::pass("NoDuplicateItems", STRUCTURE),
        }
    }

    /// Which buckets of `index` hold each item.
    fn memberships(index: &IndexSnapshot) -> HashMap<u64, Vec<u64>> {
        let mut map: HashMap<u64, Vec<u64>> = HashMap::new();
        for (bucket, members) in &index.buckets {
            for item in members {
                map.entry(*item).or_default().push(*bucket);
            }
        }
        map
    }

    fn check_index_coverage(&self) -> PropertyResult {
        for index in self.collection.indexes() {
            let memberships = Self::memberships(&index);
            for (item, expected) in &index.expected_buckets {
                let Some(expected) = expected else { continue };
                let found = memberships.get(item).map(Vec::as_slice).unwrap_or(&[]);
                if found != [*expected] {
                    return PropertyResult::fail(
                        "IndexCoverage",
                        STRUCTURE,
                        format!(
                            "index '{}': item {} expected in bucket {} but found in {:?}",
                            index.name, item, expected, found
                        ),
                        None,
                    );
                }
            }
        }
        PropertyResult::pass("IndexCoverage", STRUCTURE)
    }

    fn check_null_values_unindexed(&self) -> PropertyResult {
        for index in self.collection.indexes() {
            let memberships = Self::memberships(&index);
            for (item, expected) in &index.expected_buckets {
                if expected.is_some() {
                    continue;
                }
                if let Some(found) = memberships.get(item) {
                    return PropertyResult::fail(
                        "NullValuesUnindexed",
                        STRUCTURE,
                        format!(
                            "index '{}': item {} has no value but sits in buckets {:?}",
                            index.name, item, found
                        ),
                        None,
                    );
                }
            }
        }
        PropertyResult::pass("NullValuesUnindexed", STRUCTURE)
    }

    fn check_no_stale_entries(&self) -> PropertyResult {
        let items: HashSet<u64> = self.collection.items().into_iter().collect();
        for index in self.collection.indexes() {
            for (bucket, members) in &index.buckets {
                if let Some(stale) = members.iter().find(|m| !items.contains(m)) {
                    return PropertyResult::fail(
                        "NoStaleEntries",
                        STRUCTURE,
                        format!(
                            "index '{}': bucket {} holds item {} which is not in the collection",
                            index.name, bucket, stale
                        ),
                        None,
                    );
                }
            }
        }
        PropertyResult::pass("NoStaleEntries", STRUCTURE)
    }

    fn check_no_empty_buckets(&self) -> PropertyResult {
        for index in self.collection.indexes() {
            if let Some((bucket, _)) = index.buckets.iter().find(|(_, m)| m.is_empty()) {
                return PropertyResult::fail(
                    "NoEmptyBuckets",
                    STRUCTURE,
                    format!("index '{}': bucket {} is empty", index.name, bucket),
                    None,
                );
            }
        }
        PropertyResult::pass("NoEmptyBuckets", STRUCTURE)
    }

    fn check_bucket_ids_in_range(&self) -> PropertyResult {
        for index in self.collection.indexes() {
            let Some(limit) = index.max_bucket_count else { continue };
            if let Some((bucket, _)) = index.buckets.iter().find(|(b, _)| *b >= limit) {
                return PropertyResult::fail(
                    "BucketIdsInRange",
                    STRUCTURE,
                    format!(
                        "index '{}': bucket id {} not below limit {}",
                        index.name, bucket, limit
                    ),
                    None,
                );
            }
        }
        PropertyResult::pass("BucketIdsInRange", STRUCTURE)
    }
}

impl<'a, T: IndexedCollectionProperties> PropertyChecker for IndexedCollectionPropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_duplicate_items(),
            self.check_index_coverage(),
            self.check_null_values_unindexed(),
            self.check_no_stale_entries(),
            self.check_no_empty_buckets(),
            self.check_bucket_ids_in_range(),
        ]
    }
}
