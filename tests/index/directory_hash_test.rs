use lumbung::{
    config::StorageConfig,
    index::{IndexStore, directory_hash::DirectoryHashIndex},
    types::{
        error::DatabaseError,
        rid::Rid,
        value::{DataType, Value},
    },
    utils::mock::TempDatabase,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn int(i: i64) -> Value {
    Value::Integer(i)
}

fn small_hash_config() -> StorageConfig {
    StorageConfig::new()
        .page_size(128)
        .hash_initial_global_depth(1)
        .hash_max_global_depth(12)
}

#[test]
fn test_directory_doubles_and_lookups_stay_exact() {
    let temp = TempDatabase::new().unwrap();
    let mut index = DirectoryHashIndex::create(
        &temp.file("double.idx"),
        DataType::Integer,
        true,
        &small_hash_config(),
    )
    .unwrap();
    assert_eq!(index.global_depth(), 1);
    assert_eq!(index.bucket_capacity(), 7);

    for k in 0..500 {
        index.insert(&int(k * 7919), Rid::new(k as u32, 3)).unwrap();
    }
    assert!(index.global_depth() > 1);
    assert_eq!(index.directory_len(), 1 << index.global_depth());

    for k in 0..500 {
        assert_eq!(
            index.search(&int(k * 7919)).unwrap(),
            vec![Rid::new(k as u32, 3)]
        );
    }
    // No false positives for keys never inserted.
    for k in 0..500 {
        assert!(index.search(&int(k * 7919 + 1)).unwrap().is_empty());
    }

    let stats = index.stats().unwrap();
    assert_eq!(stats.entries, 500);
    assert_eq!(stats.global_depth, index.global_depth());
    assert!(stats.buckets > 2);
    assert!(stats.buckets as usize <= index.directory_len());
}

#[test]
fn test_identical_keys_spill_to_overflow_pages() {
    let temp = TempDatabase::new().unwrap();
    let mut index = DirectoryHashIndex::create(
        &temp.file("same.idx"),
        DataType::Integer,
        false,
        &small_hash_config(),
    )
    .unwrap();
    for slot in 0..40 {
        index.insert(&int(42), Rid::new(9, slot)).unwrap();
    }
    let stats = index.stats().unwrap();
    assert!(stats.overflow_pages >= 5);
    assert!(index.global_depth() <= index.max_global_depth());

    let hits = index.search(&int(42)).unwrap();
    assert_eq!(hits.len(), 40);
    assert!(index.remove_entry(&int(42), Rid::new(9, 17)).unwrap());
    assert!(!index.remove_entry(&int(42), Rid::new(9, 17)).unwrap());
    assert_eq!(index.search(&int(42)).unwrap().len(), 39);
    assert_eq!(index.remove(&int(42)).unwrap(), 39);
    assert!(index.is_empty());
}

#[test]
fn test_max_depth_caps_directory() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::new()
        .page_size(128)
        .hash_initial_global_depth(1)
        .hash_max_global_depth(2);
    let mut index =
        DirectoryHashIndex::create(&temp.file("capped.idx"), DataType::Integer, false, &config)
            .unwrap();
    for k in 0..200 {
        index.insert(&int(k), Rid::new(k as u32, 0)).unwrap();
    }
    assert_eq!(index.global_depth(), 2);
    assert_eq!(index.directory_len(), 4);
    assert!(index.stats().unwrap().overflow_pages > 0);
    for k in 0..200 {
        assert_eq!(index.search(&int(k)).unwrap(), vec![Rid::new(k as u32, 0)]);
    }
}

#[test]
fn test_range_is_unsupported() {
    let temp = TempDatabase::new().unwrap();
    let mut index = DirectoryHashIndex::create(
        &temp.file("range.idx"),
        DataType::Integer,
        false,
        &StorageConfig::default(),
    )
    .unwrap();
    assert!(matches!(
        index.range(&int(1), &int(5)),
        Err(DatabaseError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_unique_rejects_duplicates() {
    let temp = TempDatabase::new().unwrap();
    let mut index = DirectoryHashIndex::create(
        &temp.file("unique.idx"),
        DataType::Varchar(10),
        true,
        &StorageConfig::default(),
    )
    .unwrap();
    let key = Value::Text("surabaya".to_string());
    index.insert(&key, Rid::new(0, 0)).unwrap();
    assert!(matches!(
        index.insert(&key, Rid::new(0, 1)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
}

#[test]
fn test_random_keys_survive_reopen() {
    let temp = TempDatabase::new().unwrap();
    let path = temp.file("reopen.idx");
    let mut rng = StdRng::seed_from_u64(5);
    let keys: Vec<i64> = (0..300).map(|_| rng.random_range(-1_000_000..1_000_000)).collect();
    let depth;
    {
        let mut index =
            DirectoryHashIndex::create(&path, DataType::Integer, false, &small_hash_config())
                .unwrap();
        for (i, k) in keys.iter().enumerate() {
            index.insert(&int(*k), Rid::new(i as u32, 0)).unwrap();
        }
        depth = index.global_depth();
        index.close().unwrap();
    }

    let mut index = DirectoryHashIndex::open(&path, &small_hash_config()).unwrap();
    assert_eq!(index.global_depth(), depth);
    assert_eq!(index.len(), 300);
    for (i, k) in keys.iter().enumerate() {
        assert!(index.search(&int(*k)).unwrap().contains(&Rid::new(i as u32, 0)));
    }
}
