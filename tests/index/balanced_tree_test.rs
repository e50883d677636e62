use lumbung::{
    config::StorageConfig,
    index::{IndexStore, balanced_tree::BalancedTreeIndex},
    types::{
        error::DatabaseError,
        rid::Rid,
        value::{DataType, Value},
    },
    utils::mock::TempDatabase,
};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

fn int(i: i64) -> Value {
    Value::Integer(i)
}

fn small_pages() -> StorageConfig {
    StorageConfig::new().page_size(64)
}

#[test]
fn test_ascending_inserts_stay_balanced() {
    let temp = TempDatabase::new().unwrap();
    let mut tree =
        BalancedTreeIndex::create(&temp.file("asc.idx"), DataType::Integer, true, &small_pages())
            .unwrap();
    for k in 1..=127 {
        tree.insert(&int(k), Rid::new(k as u32, 0)).unwrap();
    }
    assert_eq!(tree.verify().unwrap(), 7);
    assert_eq!(tree.height().unwrap(), 7);
    assert!(tree.rotation_count() > 0);
    assert_eq!(tree.stats().unwrap().rotations, tree.rotation_count() as u64);
}

#[test]
fn test_random_inserts_and_removals_keep_invariants() {
    let temp = TempDatabase::new().unwrap();
    let mut tree =
        BalancedTreeIndex::create(&temp.file("rand.idx"), DataType::Integer, true, &small_pages())
            .unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let mut keys: Vec<i64> = (0..400).collect();
    keys.shuffle(&mut rng);
    for k in &keys {
        tree.insert(&int(*k), Rid::new(*k as u32, 0)).unwrap();
    }
    let height = tree.verify().unwrap();
    // AVL height bound: 1.44 * log2(n + 2)
    assert!(height <= 12, "height {} too large", height);

    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(250);
    for (i, k) in gone.iter().enumerate() {
        assert_eq!(tree.remove(&int(*k)).unwrap(), 1);
        if i % 50 == 0 {
            tree.verify().unwrap();
        }
    }
    tree.verify().unwrap();
    assert_eq!(tree.len(), 150);

    for k in gone {
        assert!(tree.search(&int(*k)).unwrap().is_empty());
    }
    for k in kept {
        assert_eq!(tree.search(&int(*k)).unwrap(), vec![Rid::new(*k as u32, 0)]);
    }

    let mut expected: Vec<i64> = kept.iter().copied().filter(|k| (100..200).contains(k)).collect();
    expected.sort();
    let hits: Vec<i64> = tree
        .range(&int(100), &int(199))
        .unwrap()
        .into_iter()
        .map(|rid| rid.page_id as i64)
        .collect();
    assert_eq!(hits, expected);
}

#[test]
fn test_freed_nodes_are_reused() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = BalancedTreeIndex::create(
        &temp.file("reuse.idx"),
        DataType::Integer,
        false,
        &small_pages(),
    )
    .unwrap();
    for k in 0..10 {
        tree.insert(&int(k), Rid::new(0, k as u32)).unwrap();
    }
    for k in 0..10 {
        tree.remove(&int(k)).unwrap();
    }
    let stats = tree.stats().unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.pages, 11);
    assert_eq!(stats.free_pages, 10);
    assert_eq!(tree.height().unwrap(), 0);

    for k in 0..5 {
        tree.insert(&int(k), Rid::new(1, k as u32)).unwrap();
    }
    let stats = tree.stats().unwrap();
    assert_eq!(stats.pages, 11);
    assert_eq!(stats.free_pages, 5);
    tree.verify().unwrap();
}

#[test]
fn test_duplicate_keys_share_one_node() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = BalancedTreeIndex::create(
        &temp.file("dups.idx"),
        DataType::Varchar(12),
        false,
        &StorageConfig::default(),
    )
    .unwrap();
    let city = Value::Text("bandung".to_string());
    for slot in 0..6 {
        tree.insert(&city, Rid::new(4, slot)).unwrap();
    }
    tree.insert(&Value::Text("bogor".to_string()), Rid::new(5, 0)).unwrap();

    assert_eq!(tree.search(&city).unwrap().len(), 6);
    assert!(tree.remove_entry(&city, Rid::new(4, 0)).unwrap());
    assert_eq!(
        tree.search(&city).unwrap(),
        (1..6).map(|s| Rid::new(4, s)).collect::<Vec<_>>()
    );
    assert_eq!(tree.verify().unwrap(), 2);
}

#[test]
fn test_unique_rejects_duplicates() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = BalancedTreeIndex::create(
        &temp.file("unique.idx"),
        DataType::Integer,
        true,
        &StorageConfig::default(),
    )
    .unwrap();
    tree.insert(&int(1), Rid::new(0, 0)).unwrap();
    assert!(matches!(
        tree.insert(&int(1), Rid::new(0, 1)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
}

#[test]
fn test_contents_survive_reopen() {
    let temp = TempDatabase::new().unwrap();
    let path = temp.file("reopen.idx");
    {
        let mut tree =
            BalancedTreeIndex::create(&path, DataType::Real, false, &small_pages()).unwrap();
        for k in 0..50 {
            tree.insert(&Value::Real(k as f64 * 0.5), Rid::new(k, 0)).unwrap();
        }
        tree.flush().unwrap();
    }
    let mut tree = BalancedTreeIndex::open(&path, &small_pages()).unwrap();
    assert_eq!(tree.len(), 50);
    tree.verify().unwrap();
    assert_eq!(tree.search(&Value::Real(12.5)).unwrap(), vec![Rid::new(25, 0)]);
    assert_eq!(
        tree.range(&Value::Real(1.0), &Value::Real(2.0)).unwrap(),
        vec![Rid::new(2, 0), Rid::new(3, 0), Rid::new(4, 0)]
    );
}
