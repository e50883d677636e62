use lumbung::{
    config::StorageConfig,
    index::{IndexStore, staged_tree::StagedTreeIndex},
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
    StorageConfig::new().page_size(128)
}

fn shuffled_entries(n: i64, seed: u64) -> Vec<(Value, Rid)> {
    let mut entries: Vec<(Value, Rid)> = (0..n).map(|k| (int(k), Rid::new(k as u32, 0))).collect();
    entries.shuffle(&mut StdRng::seed_from_u64(seed));
    entries
}

#[test]
fn test_build_lays_out_static_levels() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = StagedTreeIndex::build(
        &temp.file("build.idx"),
        DataType::Integer,
        true,
        &small_pages(),
        shuffled_entries(200, 1),
    )
    .unwrap();

    // 7 slots per leaf, 10 children per index page.
    assert_eq!(tree.leaf_count(), 29);
    assert_eq!(tree.levels(), 3);
    assert_eq!(tree.len(), 200);

    for k in 0..200 {
        assert_eq!(tree.search(&int(k)).unwrap(), vec![Rid::new(k as u32, 0)]);
    }
    assert!(tree.search(&int(200)).unwrap().is_empty());

    let hits = tree.range(&int(40), &int(59)).unwrap();
    let expected: Vec<Rid> = (40..60).map(|k| Rid::new(k, 0)).collect();
    assert_eq!(hits, expected);
}

#[test]
fn test_inserts_past_capacity_chain_overflow_pages() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = StagedTreeIndex::build(
        &temp.file("overflow.idx"),
        DataType::Integer,
        false,
        &small_pages(),
        shuffled_entries(70, 2),
    )
    .unwrap();
    assert_eq!(tree.stats().unwrap().overflow_pages, 0);

    for i in 0..30 {
        tree.insert(&int(35), Rid::new(1000 + i, 0)).unwrap();
    }
    let stats = tree.stats().unwrap();
    assert!(stats.overflow_pages >= 4);
    assert_eq!(stats.entries, 100);
    assert_eq!(tree.leaf_count(), 10);

    let hits = tree.search(&int(35)).unwrap();
    assert_eq!(hits.len(), 31);
    assert_eq!(tree.range(&int(30), &int(40)).unwrap().len(), 41);
}

#[test]
fn test_rebuild_folds_overflow_and_drops_tombstones() {
    let temp = TempDatabase::new().unwrap();
    let path = temp.file("rebuild.idx");
    let mut tree = StagedTreeIndex::build(
        &path,
        DataType::Integer,
        false,
        &small_pages(),
        shuffled_entries(50, 3),
    )
    .unwrap();
    for k in 50..120 {
        tree.insert(&int(k), Rid::new(k as u32, 0)).unwrap();
    }
    for k in (0..120).step_by(3) {
        assert_eq!(tree.remove(&int(k)).unwrap(), 1);
    }
    let before = tree.stats().unwrap();
    assert!(before.overflow_pages > 0);
    assert_eq!(before.tombstones, 40);
    assert_eq!(before.entries, 80);

    tree.rebuild().unwrap();
    let after = tree.stats().unwrap();
    assert_eq!(after.overflow_pages, 0);
    assert_eq!(after.tombstones, 0);
    assert_eq!(after.entries, 80);
    assert_eq!(tree.leaf_count(), 12);

    let live: Vec<i64> = tree
        .live_entries()
        .unwrap()
        .into_iter()
        .map(|(key, _)| match key {
            Value::Integer(k) => k,
            _ => panic!("unexpected key"),
        })
        .collect();
    let expected: Vec<i64> = (0..120).filter(|k| k % 3 != 0).collect();
    assert_eq!(live, expected);

    drop(tree);
    let mut reopened = StagedTreeIndex::open(&path, &small_pages()).unwrap();
    assert_eq!(reopened.search(&int(119)).unwrap(), vec![Rid::new(119, 0)]);
    assert!(reopened.search(&int(117)).unwrap().is_empty());
}

#[test]
fn test_build_keeps_duplicate_input_order() {
    let temp = TempDatabase::new().unwrap();
    let entries = vec![
        (int(5), Rid::new(3, 0)),
        (int(1), Rid::new(0, 0)),
        (int(5), Rid::new(1, 0)),
        (int(5), Rid::new(2, 0)),
    ];
    let mut tree = StagedTreeIndex::build(
        &temp.file("dups.idx"),
        DataType::Integer,
        false,
        &StorageConfig::default(),
        entries,
    )
    .unwrap();
    assert_eq!(
        tree.search(&int(5)).unwrap(),
        vec![Rid::new(3, 0), Rid::new(1, 0), Rid::new(2, 0)]
    );
    assert!(tree.remove_entry(&int(5), Rid::new(1, 0)).unwrap());
    assert_eq!(
        tree.search(&int(5)).unwrap(),
        vec![Rid::new(3, 0), Rid::new(2, 0)]
    );
}

#[test]
fn test_unique_build_rejects_duplicates() {
    let temp = TempDatabase::new().unwrap();
    let entries = vec![(int(1), Rid::new(0, 0)), (int(1), Rid::new(0, 1))];
    assert!(matches!(
        StagedTreeIndex::build(
            &temp.file("unique.idx"),
            DataType::Integer,
            true,
            &StorageConfig::default(),
            entries,
        ),
        Err(DatabaseError::DuplicateKey { .. })
    ));
}

#[test]
fn test_empty_tree_accepts_inserts() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = StagedTreeIndex::create(
        &temp.file("empty.idx"),
        DataType::Real,
        true,
        &small_pages(),
    )
    .unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.levels(), 1);

    for i in 0..20 {
        tree.insert(&Value::Real(i as f64 / 2.0), Rid::new(i, 0)).unwrap();
    }
    assert_eq!(tree.search(&Value::Real(3.5)).unwrap(), vec![Rid::new(7, 0)]);
    assert!(matches!(
        tree.insert(&Value::Real(3.5), Rid::new(99, 0)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
    assert_eq!(
        tree.range(&Value::Real(1.0), &Value::Real(2.0)).unwrap().len(),
        3
    );
}
