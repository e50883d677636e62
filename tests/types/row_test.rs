use chrono::NaiveDate;
use lumbung::types::{
    row::Row,
    value::{Point, Value},
};

fn sample_row() -> Row {
    Row::new(vec![
        Value::Integer(1),
        Value::Text("Alice".to_string()),
        Value::Real(1.75),
        Value::Null,
        Value::Date(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()),
        Value::Point(Point::new(106.8, -6.2)),
    ])
}

#[test]
fn test_row_bytes_round_trip() {
    let row = sample_row();
    let bytes = row.to_bytes();
    assert_eq!(bytes.len(), row.size());
    assert_eq!(Row::from_bytes(&bytes).unwrap(), row);
}

#[test]
fn test_empty_row_round_trip() {
    let row = Row::new(Vec::new());
    assert_eq!(row.to_bytes(), vec![0, 0]);
    assert_eq!(Row::from_bytes(&[0, 0]).unwrap(), row);
}

#[test]
fn test_row_size_accounts_for_tags() {
    let row = Row::new(vec![Value::Integer(5), Value::Null]);
    // count (2) + tagged integer (9) + tagged null (1)
    assert_eq!(row.size(), 12);
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let mut bytes = sample_row().to_bytes();
    bytes.push(0);
    assert!(Row::from_bytes(&bytes).is_err());
}

#[test]
fn test_truncated_row_is_rejected() {
    let bytes = sample_row().to_bytes();
    assert!(Row::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    assert!(Row::from_bytes(&[1]).is_err());
}

#[test]
fn test_get_and_set_value() {
    let mut row = sample_row();
    assert_eq!(row.get_value(0), Some(&Value::Integer(1)));
    assert_eq!(row.get_value(10), None);

    row.set_value(3, Value::Integer(9)).unwrap();
    assert_eq!(row.get_value(3), Some(&Value::Integer(9)));
    assert!(row.set_value(6, Value::Null).is_err());
}
