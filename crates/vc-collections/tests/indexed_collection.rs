//! Indexed collection: bucket collisions, relocation driven from other
//! threads, observers and the index invariants.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::Mutex;
use vc_collections::indexed::UNBOUNDED_BUCKET_COUNT;
use vc_collections::{
    CollectionChange, CollectionError, IndexKey, IndexedCollection, ItemComparer,
    PropertyChangedSignal,
};
use vc_core::invariants::{
    IndexSnapshot, IndexedCollectionProperties, IndexedCollectionPropertyChecker,
};
use vc_core::PropertyChecker;

#[derive(Debug)]
struct Tile {
    id: u64,
    row: Mutex<Option<u32>>,
    changed: PropertyChangedSignal,
}

impl Tile {
    fn new(id: u64, row: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            id,
            row: Mutex::new(row),
            changed: PropertyChangedSignal::new(),
        })
    }

    fn row(&self) -> Option<u32> {
        *self.row.lock()
    }

    fn move_to(&self, row: Option<u32>) {
        *self.row.lock() = row;
        self.changed.notify("row");
    }
}

struct ById;

impl ItemComparer<Arc<Tile>> for ById {
    fn equals(&self, a: &Arc<Tile>, b: &Arc<Tile>) -> bool {
        a.id == b.id
    }

    fn hash(&self, item: &Arc<Tile>) -> u64 {
        item.id
    }
}

fn row_key(tile: &Arc<Tile>) -> Option<IndexKey> {
    tile.row().map(IndexKey::from)
}

fn board(max_bucket_count: usize) -> IndexedCollection<Arc<Tile>> {
    IndexedCollection::builder_with_comparer(ById)
        .max_bucket_count(max_bucket_count)
        .index("row", row_key)
        .change_notification(|t: &Arc<Tile>| Some(&t.changed))
        .build()
        .unwrap()
}

/// Exposes a tile board to the index checker, items identified by id.
struct BoardView<'a> {
    board: &'a IndexedCollection<Arc<Tile>>,
}

impl IndexedCollectionProperties for BoardView<'_> {
    fn items(&self) -> Vec<u64> {
        self.board.iter().map(|t| t.id).collect()
    }

    fn indexes(&self) -> Vec<IndexSnapshot> {
        let limit = self.board.max_bucket_count();
        let buckets = self
            .board
            .buckets("row")
            .unwrap()
            .into_iter()
            .map(|(bucket, tiles)| (bucket, tiles.iter().map(|t| t.id).collect()))
            .collect();
        let expected_buckets = self
            .board
            .iter()
            .map(|t| (t.id, row_key(&t).map(|key| self.board.bucket_of(&key))))
            .collect();
        vec![IndexSnapshot {
            name: "row".to_string(),
            max_bucket_count: (limit != UNBOUNDED_BUCKET_COUNT).then_some(limit as u64),
            buckets,
            expected_buckets,
        }]
    }
}

fn assert_indexes_hold(board: &IndexedCollection<Arc<Tile>>) {
    let view = BoardView { board };
    let checker = IndexedCollectionPropertyChecker::new(&view);
    if let Err(message) = checker.ensure_all_hold() {
        panic!("{}", message);
    }
}

#[test]
fn test_colliding_keys_share_a_bucket() {
    let numbers = IndexedCollection::builder()
        .index("value", |v: &u64| Some(IndexKey::from(*v)))
        .build()
        .unwrap();

    // 32 buckets: plenty of keys land next to 0.
    let target = numbers.bucket_of(&IndexKey::from(0u64));
    let colliding: Vec<u64> = (1..10_000u64)
        .filter(|v| numbers.bucket_of(&IndexKey::from(*v)) == target)
        .take(3)
        .collect();
    assert_eq!(colliding.len(), 3);

    numbers.add(0);
    numbers.add(colliding[0]);
    numbers.add(colliding[1]);

    assert!(numbers.contains(&colliding[0]));
    assert!(!numbers.contains(&colliding[2]));
    assert_eq!(numbers.index_of(&colliding[1]), Some(2));
    assert_eq!(numbers.find_by("value", &IndexKey::from(colliding[0])).unwrap(), vec![colliding[0]]);
    assert!(numbers.find_by("value", &IndexKey::from(colliding[2])).unwrap().is_empty());

    let buckets = numbers.buckets("value").unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].0, target);
    assert_eq!(buckets[0].1.len(), 3);
}

#[test]
fn test_unbounded_buckets() {
    let tiles = board(UNBOUNDED_BUCKET_COUNT);
    for id in 0..50 {
        tiles.add(Tile::new(id, Some((id % 7) as u32)));
    }
    assert_eq!(tiles.buckets("row").unwrap().len(), 7);
    assert_indexes_hold(&tiles);
}

#[test]
fn test_absent_values_are_unindexed() {
    let tiles = board(32);
    tiles.add(Tile::new(1, None));
    tiles.add(Tile::new(2, Some(4)));

    assert!(tiles.contains(&Tile::new(1, None)));
    assert_eq!(tiles.group_by("row").unwrap().len(), 1);
    assert_indexes_hold(&tiles);

    let first = tiles.get(0).unwrap();
    first.move_to(Some(4));
    assert_eq!(tiles.find_by("row", &IndexKey::from(4u32)).unwrap().len(), 2);
    assert_indexes_hold(&tiles);
}

#[test]
fn test_silent_moves_keep_membership() {
    let tiles = board(32);
    let moved = Tile::new(1, Some(3));
    let other = Tile::new(2, Some(3));
    tiles.add_many([Arc::clone(&moved), Arc::clone(&other)]);

    tiles.set_change_notification_enabled(false);
    moved.move_to(Some(5));
    other.move_to(None);

    assert!(!tiles.add(Arc::clone(&moved)));
    assert!(!tiles.add(Arc::clone(&other)));
    assert_eq!(tiles.len(), 2);
    assert_eq!(tiles.index_of(&moved), Some(0));
    assert_eq!(tiles.index_of(&other), Some(1));

    // Removal sweeps the stale bucket instead of leaving an entry behind.
    assert!(tiles.remove(&moved));
    assert_eq!(tiles.remove_many([&other]), 1);
    assert!(tiles.is_empty());
    assert!(tiles.buckets("row").unwrap().is_empty());
    assert_indexes_hold(&tiles);
}

#[test]
fn test_unknown_index_is_rejected() {
    let tiles = board(32);
    assert!(matches!(
        tiles.find_by("column", &IndexKey::from(1u32)),
        Err(CollectionError::InvalidArgument(_))
    ));
    assert!(matches!(tiles.first_by("row", &IndexKey::from(1u32)), Err(CollectionError::KeyNotFound(_))));
}

#[test]
fn test_relocation_from_many_threads() {
    common::init_tracing();
    const THREADS: u64 = 4;
    const TILES_PER_THREAD: u64 = 50;

    let tiles = Arc::new(board(32));
    for id in 0..THREADS * TILES_PER_THREAD {
        tiles.add(Tile::new(id, Some(0)));
    }
    let barrier = Arc::new(Barrier::new(THREADS as usize + 1));

    let movers: Vec<_> = (0..THREADS)
        .map(|t| {
            let tiles = Arc::clone(&tiles);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mine: Vec<Arc<Tile>> = tiles
                    .iter()
                    .filter(|tile| tile.id / TILES_PER_THREAD == t)
                    .collect();
                barrier.wait();
                for round in 1..=20u32 {
                    for tile in &mine {
                        let row = (round + tile.id as u32) % 9;
                        tile.move_to(if row == 0 { None } else { Some(row) });
                    }
                }
            })
        })
        .collect();

    let reader = {
        let tiles = Arc::clone(&tiles);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for row in (0..200u32).map(|i| i % 9) {
                let found = tiles.find_by("row", &IndexKey::from(row)).unwrap();
                assert!(found.len() as u64 <= THREADS * TILES_PER_THREAD);
                assert_eq!(tiles.len() as u64, THREADS * TILES_PER_THREAD);
            }
        })
    };

    for handle in movers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_indexes_hold(&tiles);
    for tile in tiles.iter() {
        let expected = (20 + tile.id as u32) % 9;
        assert_eq!(tile.row(), (expected != 0).then_some(expected));
    }
}

#[test]
fn test_concurrent_writers_keep_indexes_consistent() {
    let tiles = Arc::new(board(16));
    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let tiles = Arc::clone(&tiles);
            thread::spawn(move || {
                for i in 0..100u64 {
                    let id = t * 100 + i;
                    tiles.add(Tile::new(id, Some((id % 5) as u32)));
                    if i % 3 == 0 {
                        assert!(tiles.remove(&Tile::new(id, None)));
                    }
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }

    assert_eq!(tiles.len(), 4 * (100 - 34));
    assert_indexes_hold(&tiles);
}

#[test]
fn test_observers_see_every_change() {
    let numbers: IndexedCollection<u32> = IndexedCollection::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = {
        let seen = Arc::clone(&seen);
        numbers.observe(move |change: &CollectionChange<u32>| seen.lock().push(change.clone()))
    };

    numbers.add(1);
    numbers.insert(0, 0).unwrap();
    numbers.replace(1, 5).unwrap();
    numbers.remove(&0);
    numbers.clear();
    assert!(numbers.unobserve(id));
    numbers.add(9);

    assert_eq!(
        *seen.lock(),
        vec![
            CollectionChange::Added { item: 1, position: 0 },
            CollectionChange::Added { item: 0, position: 0 },
            CollectionChange::Replaced { old: 1, new: 5, position: 1 },
            CollectionChange::Removed { item: 0, position: 0 },
            CollectionChange::Reset,
        ]
    );
}
