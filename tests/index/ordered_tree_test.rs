use lumbung::{
    config::StorageConfig,
    index::{IndexStore, ordered_tree::OrderedTreeIndex},
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

fn rid(i: u32) -> Rid {
    Rid::new(i, 0)
}

#[test]
fn test_order_four_splits_root_once() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().ordered_tree_order(4);
    let mut tree =
        OrderedTreeIndex::create(&temp.file("o4.idx"), DataType::Integer, false, &config).unwrap();

    for k in [10, 20, 30, 40, 50] {
        tree.insert(&int(k), rid(k as u32)).unwrap();
    }
    assert_eq!(tree.order(), 4);
    assert_eq!(tree.split_count(), 1);
    assert_eq!(tree.height(), 2);
    assert_eq!(
        tree.range(&int(15), &int(45)).unwrap(),
        vec![rid(20), rid(30), rid(40)]
    );
}

#[test]
fn test_random_permutation_search_and_range() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().page_size(256).ordered_tree_order(5);
    let mut tree =
        OrderedTreeIndex::create(&temp.file("perm.idx"), DataType::Integer, true, &config).unwrap();

    let mut keys: Vec<i64> = (0..500).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));
    for k in &keys {
        tree.insert(&int(*k), rid(*k as u32)).unwrap();
    }
    assert_eq!(tree.len(), 500);
    assert!(tree.height() >= 3);

    for k in 0..500 {
        assert_eq!(tree.search(&int(k)).unwrap(), vec![rid(k as u32)]);
    }
    assert!(tree.search(&int(500)).unwrap().is_empty());
    assert!(tree.search(&int(-1)).unwrap().is_empty());

    let expected: Vec<Rid> = (123..=321).map(|k| rid(k as u32)).collect();
    assert_eq!(tree.range(&int(123), &int(321)).unwrap(), expected);
    assert!(tree.range(&int(50), &int(10)).unwrap().is_empty());

    let entries = tree.entries().unwrap();
    assert_eq!(entries.len(), 500);
    assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn test_unique_rejects_duplicates() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = OrderedTreeIndex::create(
        &temp.file("unique.idx"),
        DataType::Integer,
        true,
        &StorageConfig::default(),
    )
    .unwrap();
    tree.insert(&int(7), rid(1)).unwrap();
    assert!(matches!(
        tree.insert(&int(7), rid(2)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
    assert_eq!(tree.search(&int(7)).unwrap(), vec![rid(1)]);
}

#[test]
fn test_duplicates_keep_insertion_order() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().page_size(128).ordered_tree_order(4);
    let mut tree =
        OrderedTreeIndex::create(&temp.file("dups.idx"), DataType::Integer, false, &config).unwrap();

    for i in 0..40 {
        tree.insert(&int(i % 4), Rid::new(i as u32, 1)).unwrap();
    }
    let twos = tree.search(&int(2)).unwrap();
    let expected: Vec<Rid> = (0..40).filter(|i| i % 4 == 2).map(|i| Rid::new(i, 1)).collect();
    assert_eq!(twos, expected);

    // Removing the head locator promotes the next one.
    assert!(tree.remove_entry(&int(2), Rid::new(2, 1)).unwrap());
    assert!(!tree.remove_entry(&int(2), Rid::new(2, 1)).unwrap());
    assert_eq!(tree.search(&int(2)).unwrap(), expected[1..].to_vec());

    assert_eq!(tree.remove(&int(3)).unwrap(), 10);
    assert!(tree.search(&int(3)).unwrap().is_empty());
    assert_eq!(tree.len(), 29);
}

#[test]
fn test_emptied_leaves_survive_range_and_reinsert() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().ordered_tree_order(4);
    let mut tree =
        OrderedTreeIndex::create(&temp.file("hollow.idx"), DataType::Integer, false, &config)
            .unwrap();
    for k in 0..200 {
        tree.insert(&int(k), rid(k as u32)).unwrap();
    }
    for k in 20..180 {
        assert_eq!(tree.remove(&int(k)).unwrap(), 1);
    }
    assert_eq!(tree.len(), 40);

    let survivors: Vec<Rid> = (0..20).chain(180..200).map(rid).collect();
    assert_eq!(tree.range(&int(0), &int(199)).unwrap(), survivors);
    assert!(tree.range(&int(50), &int(150)).unwrap().is_empty());
    assert!(tree.search(&int(100)).unwrap().is_empty());

    for k in (60..70).rev() {
        tree.insert(&int(k), rid(k as u32)).unwrap();
    }
    let refilled: Vec<Rid> = (0..20).chain(60..70).chain(180..200).map(rid).collect();
    assert_eq!(tree.range(&int(0), &int(199)).unwrap(), refilled);
    assert_eq!(tree.range(&int(55), &int(65)).unwrap(), (60..66).map(rid).collect::<Vec<_>>());
}

#[test]
fn test_varchar_keys_order_lexicographically() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().ordered_tree_order(4);
    let mut tree =
        OrderedTreeIndex::create(&temp.file("text.idx"), DataType::Varchar(8), false, &config)
            .unwrap();
    let words = ["pear", "apple", "fig", "kiwi", "banana", "cherry", "date"];
    for (i, w) in words.iter().enumerate() {
        tree.insert(&Value::Text(w.to_string()), rid(i as u32)).unwrap();
    }
    let hits = tree
        .range(&Value::Text("b".to_string()), &Value::Text("g".to_string()))
        .unwrap();
    // banana, cherry, date, fig
    assert_eq!(hits, vec![rid(4), rid(5), rid(6), rid(2)]);
}

#[test]
fn test_wrong_key_type_is_rejected() {
    let temp = TempDatabase::new().unwrap();
    let mut tree = OrderedTreeIndex::create(
        &temp.file("typed.idx"),
        DataType::Integer,
        false,
        &StorageConfig::default(),
    )
    .unwrap();
    assert!(matches!(
        tree.insert(&Value::Real(1.0), rid(0)),
        Err(DatabaseError::TypeMismatch { .. })
    ));
    assert!(matches!(
        tree.insert(&Value::Null, rid(0)),
        Err(DatabaseError::TypeMismatch { .. })
    ));
}

#[test]
fn test_contents_survive_reopen() {
    let temp = TempDatabase::new().unwrap();
    let path = temp.file("reopen.idx");
    let config = StorageConfig::new().page_size(512).ordered_tree_order(8);
    {
        let mut tree = OrderedTreeIndex::create(&path, DataType::Integer, false, &config).unwrap();
        for k in (0..300).rev() {
            tree.insert(&int(k), rid(k as u32)).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = OrderedTreeIndex::open(&path, &config).unwrap();
    assert_eq!(tree.len(), 300);
    assert_eq!(tree.search(&int(150)).unwrap(), vec![rid(150)]);
    assert_eq!(tree.range(&int(0), &int(4)).unwrap().len(), 5);
    let stats = tree.stats().unwrap();
    assert_eq!(stats.entries, 300);
    assert_eq!(stats.height, tree.height());
}

#[test]
fn test_order_is_capped_by_page_size() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new().page_size(64).ordered_tree_order(64);
    let tree =
        OrderedTreeIndex::create(&temp.file("cap.idx"), DataType::Integer, false, &config).unwrap();
    assert_eq!(
        tree.order(),
        OrderedTreeIndex::max_order_for(64, &DataType::Integer)
    );
    assert!(tree.order() >= 3);
}
