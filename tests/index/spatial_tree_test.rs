use lumbung::{
    config::StorageConfig,
    index::{IndexStore, spatial_tree::SpatialTreeIndex},
    types::{
        error::DatabaseError,
        rid::Rid,
        value::{Point, Value},
    },
    utils::mock::TempDatabase,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_points(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Point::new(rng.random_range(0.0..100.0), rng.random_range(0.0..100.0)))
        .collect()
}

fn narrow_config() -> StorageConfig {
    StorageConfig::new().spatial_max_entries(4)
}

fn load(tree: &mut SpatialTreeIndex, points: &[Point]) {
    for (i, p) in points.iter().enumerate() {
        tree.insert(&Value::Point(*p), Rid::new(i as u32, 0)).unwrap();
    }
}

/// Brute-force radius query: indexes ordered by distance, then insertion.
fn brute_radius(points: &[Point], center: Point, radius: f64) -> Vec<u32> {
    let mut hits: Vec<(f64, u32)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (p.distance(&center), i as u32))
        .filter(|(d, _)| *d <= radius)
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, i)| i).collect()
}

#[test]
fn test_radius_search_matches_brute_force() {
    let temp = TempDatabase::new().unwrap();
    let points = random_points(600, 11);
    let mut tree = SpatialTreeIndex::create(&temp.file("radius.idx"), false, &narrow_config()).unwrap();
    load(&mut tree, &points);
    assert!(tree.height() >= 4);
    assert!(tree.stats().unwrap().splits > 0);

    for (center, radius) in [
        (Point::new(50.0, 50.0), 10.0),
        (Point::new(0.0, 0.0), 25.0),
        (Point::new(99.0, 1.0), 3.0),
        (Point::new(-20.0, 50.0), 5.0),
    ] {
        let found: Vec<u32> = tree
            .range_search(center, radius)
            .unwrap()
            .into_iter()
            .map(|m| m.rid.page_id)
            .collect();
        assert_eq!(found, brute_radius(&points, center, radius));
    }
}

#[test]
fn test_knn_matches_brute_force() {
    let temp = TempDatabase::new().unwrap();
    let points = random_points(400, 12);
    let mut tree = SpatialTreeIndex::create(&temp.file("knn.idx"), false, &narrow_config()).unwrap();
    load(&mut tree, &points);

    for center in [Point::new(10.0, 90.0), Point::new(50.0, 50.0), Point::new(150.0, -3.0)] {
        let everything = brute_radius(&points, center, f64::INFINITY);
        for k in [1, 5, 17] {
            let found: Vec<u32> = tree
                .knn(center, k)
                .unwrap()
                .into_iter()
                .map(|m| m.rid.page_id)
                .collect();
            assert_eq!(found, everything[..k].to_vec());
        }
    }

    let all = tree.knn(Point::new(0.0, 0.0), 1000).unwrap();
    assert_eq!(all.len(), 400);
    assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(tree.knn(Point::new(0.0, 0.0), 0).unwrap().is_empty());
}

#[test]
fn test_equal_distances_keep_insertion_order() {
    let temp = TempDatabase::new().unwrap();
    let mut tree =
        SpatialTreeIndex::create(&temp.file("ties.idx"), false, &narrow_config()).unwrap();
    // Four points at distance 1 from the origin plus a duplicate location.
    let points = [
        Point::new(1.0, 0.0),
        Point::new(0.0, 1.0),
        Point::new(-1.0, 0.0),
        Point::new(0.0, -1.0),
        Point::new(1.0, 0.0),
        Point::new(5.0, 5.0),
    ];
    load(&mut tree, &points);

    let ids: Vec<u32> = tree
        .range_search(Point::new(0.0, 0.0), 1.0)
        .unwrap()
        .into_iter()
        .map(|m| m.rid.page_id)
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    let ids: Vec<u32> = tree
        .knn(Point::new(0.0, 0.0), 3)
        .unwrap()
        .into_iter()
        .map(|m| m.rid.page_id)
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_exact_search_and_window_range() {
    let temp = TempDatabase::new().unwrap();
    let points = random_points(200, 13);
    let mut tree =
        SpatialTreeIndex::create(&temp.file("window.idx"), false, &narrow_config()).unwrap();
    load(&mut tree, &points);

    assert_eq!(
        tree.search(&Value::Point(points[77])).unwrap(),
        vec![Rid::new(77, 0)]
    );
    assert!(tree.search(&Value::Point(Point::new(-1.0, -1.0))).unwrap().is_empty());

    let low = Point::new(20.0, 30.0);
    let high = Point::new(45.0, 70.0);
    let expected: Vec<Rid> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.x >= low.x && p.x <= high.x && p.y >= low.y && p.y <= high.y)
        .map(|(i, _)| Rid::new(i as u32, 0))
        .collect();
    assert_eq!(
        tree.range(&Value::Point(low), &Value::Point(high)).unwrap(),
        expected
    );
    assert!(tree
        .range(&Value::Point(high), &Value::Point(low))
        .unwrap()
        .is_empty());
}

#[test]
fn test_removal_tightens_and_collapses() {
    let temp = TempDatabase::new().unwrap();
    let points = random_points(150, 14);
    let mut tree =
        SpatialTreeIndex::create(&temp.file("remove.idx"), false, &narrow_config()).unwrap();
    load(&mut tree, &points);

    for (i, p) in points.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        assert!(tree.remove_entry(&Value::Point(*p), Rid::new(i as u32, 0)).unwrap());
    }
    assert_eq!(tree.len(), 75);

    let center = Point::new(40.0, 60.0);
    let mut expected: Vec<(f64, u32)> = points
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(i, p)| (p.distance(&center), i as u32))
        .filter(|(d, _)| *d <= 30.0)
        .collect();
    expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let found: Vec<u32> = tree
        .range_search(center, 30.0)
        .unwrap()
        .into_iter()
        .map(|m| m.rid.page_id)
        .collect();
    assert_eq!(found, expected.into_iter().map(|(_, i)| i).collect::<Vec<_>>());

    for p in points.iter().skip(1).step_by(2) {
        assert_eq!(tree.remove(&Value::Point(*p)).unwrap(), 1);
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert!(tree.knn(center, 3).unwrap().is_empty());
    assert!(tree.stats().unwrap().free_pages > 0);

    // The emptied tree keeps working.
    load(&mut tree, &points[..10]);
    assert_eq!(tree.knn(points[3], 1).unwrap()[0].rid, Rid::new(3, 0));
}

#[test]
fn test_unique_points() {
    let temp = TempDatabase::new().unwrap();
    let mut tree =
        SpatialTreeIndex::create(&temp.file("unique.idx"), true, &StorageConfig::default()).unwrap();
    let p = Value::Point(Point::new(3.0, 4.0));
    tree.insert(&p, Rid::new(0, 0)).unwrap();
    assert!(matches!(
        tree.insert(&p, Rid::new(0, 1)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
    assert!(matches!(
        tree.insert(&Value::Integer(3), Rid::new(0, 2)),
        Err(DatabaseError::TypeMismatch { .. })
    ));
}

#[test]
fn test_tree_survives_reopen() {
    let temp = TempDatabase::new().unwrap();
    let path = temp.file("reopen.idx");
    let points = random_points(120, 15);
    let height;
    {
        let mut tree = SpatialTreeIndex::create(&path, false, &narrow_config()).unwrap();
        load(&mut tree, &points);
        height = tree.height();
        tree.close().unwrap();
    }
    let mut tree = SpatialTreeIndex::open(&path, &narrow_config()).unwrap();
    assert_eq!(tree.height(), height);
    assert_eq!(tree.len(), 120);
    assert_eq!(tree.max_entries(), 4);

    let center = Point::new(25.0, 75.0);
    let found: Vec<u32> = tree
        .range_search(center, 20.0)
        .unwrap()
        .into_iter()
        .map(|m| m.rid.page_id)
        .collect();
    assert_eq!(found, brute_radius(&points, center, 20.0));

    // Insertion order carries on after reopening.
    tree.insert(&Value::Point(points[0]), Rid::new(500, 0)).unwrap();
    let ids: Vec<u32> = tree
        .range_search(points[0], 0.0)
        .unwrap()
        .into_iter()
        .map(|m| m.rid.page_id)
        .collect();
    assert_eq!(ids, vec![0, 500]);
}
