use lumbung::{
    config::{DefaultIndexPolicy, StorageConfig},
    database::catalog::Database,
    index::IndexKind,
    storage::schema::{ColumnSchema, TableSchema},
    types::{
        error::DatabaseError,
        row::Row,
        value::{DataType, Point, Value},
    },
    utils::mock::TempDatabase,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sensors_schema() -> TableSchema {
    init_logger();
    TableSchema::new(
        "sensors",
        vec![
            ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
            ColumnSchema::new("label", DataType::Varchar(12), 1).with_index(IndexKind::Hash),
            ColumnSchema::new("reading", DataType::Real, 2),
            ColumnSchema::new("note", DataType::Varchar(24), 3),
            ColumnSchema::new("position", DataType::Point, 4),
        ],
    )
}

fn sensor(id: i64, reading: f64) -> Row {
    Row::new(vec![
        Value::Integer(id),
        Value::Text(format!("s{}", id % 4)),
        Value::Real(reading),
        Value::Null,
        Value::Point(Point::new(id as f64, reading)),
    ])
}

fn logs_schema() -> TableSchema {
    TableSchema::new(
        "logs",
        vec![
            ColumnSchema::new("seq", DataType::Integer, 0).primary_key(),
            ColumnSchema::new("message", DataType::Varchar(32), 1),
        ],
    )
}

#[test]
fn test_fill_missing_policy_indexes_bare_candidates() {
    let temp = TempDatabase::new().unwrap();
    let mut db = temp.open_database(StorageConfig::default()).unwrap();
    let table = db.create_table(sensors_schema()).unwrap();

    assert_eq!(table.index_kinds("id"), vec![IndexKind::Ordered]);
    assert_eq!(table.index_kinds("reading"), vec![IndexKind::Ordered]);
    assert_eq!(table.index_kinds("label"), vec![IndexKind::Hash]);
    assert!(table.index_kinds("note").is_empty());
    assert!(table.index_kinds("position").is_empty());
    assert_eq!(table.schema().page_size, StorageConfig::default().page_size);
}

#[test]
fn test_off_policy_keeps_declared_indexes_only() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::default()
        .page_size(1024)
        .default_index_policy(DefaultIndexPolicy::Off);
    let mut db = temp.open_database(config).unwrap();
    let table = db
        .create_table(sensors_schema().with_page_size(8192))
        .unwrap();

    assert!(table.index_kinds("id").is_empty());
    assert_eq!(table.index_kinds("label"), vec![IndexKind::Hash]);
    assert_eq!(table.schema().page_size, 1024);
}

#[test]
fn test_create_list_and_drop_tables() {
    let temp = TempDatabase::new().unwrap();
    let mut db = temp.open_database(StorageConfig::default()).unwrap();
    db.create_table(sensors_schema()).unwrap();
    db.create_table(logs_schema()).unwrap();

    assert_eq!(db.list_tables(), vec!["sensors".to_string(), "logs".to_string()]);
    assert!(matches!(
        db.create_table(logs_schema()),
        Err(DatabaseError::TableAlreadyExists { .. })
    ));

    let dir = db.get_table("sensors").unwrap().dir().to_path_buf();
    assert!(dir.exists());
    db.drop_table("sensors").unwrap();
    assert!(!dir.exists());
    assert!(!db.has_table("sensors"));
    assert_eq!(db.list_tables(), vec!["logs".to_string()]);

    assert!(matches!(
        db.get_table("sensors"),
        Err(DatabaseError::TableNotFound { .. })
    ));
    assert!(matches!(
        db.drop_table("sensors"),
        Err(DatabaseError::TableNotFound { .. })
    ));
}

#[test]
fn test_invalid_schema_is_not_cataloged() {
    let temp = TempDatabase::new().unwrap();
    let mut db = temp.open_database(StorageConfig::default()).unwrap();
    let bad = TableSchema::new(
        "bad",
        vec![ColumnSchema::new("spot", DataType::Integer, 0).with_index(IndexKind::Spatial)],
    );
    assert!(db.create_table(bad).is_err());
    assert!(db.list_tables().is_empty());
}

#[test]
fn test_reopen_restores_tables_and_rows() {
    let temp = TempDatabase::new().unwrap();
    let config = StorageConfig::default();
    {
        let mut db = temp.open_database(config.clone()).unwrap();
        let sensors = db.create_table(sensors_schema()).unwrap();
        for id in 0..40 {
            sensors.insert(sensor(id, id as f64 * 0.5)).unwrap();
        }
        let logs = db.create_table(logs_schema()).unwrap();
        logs.insert(Row::new(vec![
            Value::Integer(1),
            Value::Text("booted".to_string()),
        ]))
        .unwrap();
        db.flush().unwrap();
        db.close().unwrap();
    }

    let mut db = Database::open(temp.path().join("db"), config).unwrap();
    assert_eq!(db.list_tables(), vec!["sensors".to_string(), "logs".to_string()]);

    let sensors = db.get_table("sensors").unwrap();
    assert_eq!(sensors.len(), 40);
    assert_eq!(sensors.index_kinds("reading"), vec![IndexKind::Ordered]);
    let warm = sensors
        .range_query("reading", &Value::Real(5.0), &Value::Real(6.0))
        .unwrap();
    let ids: Vec<Value> = warm.iter().map(|row| row.values[0].clone()).collect();
    assert_eq!(
        ids,
        vec![Value::Integer(10), Value::Integer(11), Value::Integer(12)]
    );
    assert!(matches!(
        sensors.insert(sensor(3, 0.0)),
        Err(DatabaseError::DuplicateKey { .. })
    ));
    assert_eq!(
        sensors
            .point_query("label", &Value::Text("s1".to_string()))
            .unwrap()
            .len(),
        10
    );

    let logs = db.get_table("logs").unwrap();
    assert_eq!(logs.len(), 1);
}
