use std::cmp::Ordering;

use chrono::NaiveDate;
use lumbung::types::{
    error::DatabaseError,
    value::{DataType, Point, Value},
};

#[test]
fn test_data_type_parsing() {
    assert_eq!(DataType::from_string("integer").unwrap(), DataType::Integer);
    assert_eq!(DataType::from_string("FLOAT").unwrap(), DataType::Real);
    assert_eq!(DataType::from_string(" varchar(12) ").unwrap(), DataType::Varchar(12));
    assert_eq!(DataType::from_string("DATE").unwrap(), DataType::Date);
    assert_eq!(DataType::from_string("ARRAY_FLOAT").unwrap(), DataType::Point);
    assert!(DataType::from_string("VARCHAR(x)").is_err());
    assert!(DataType::from_string("BLOB").is_err());
}

#[test]
fn test_key_widths() {
    assert_eq!(DataType::Integer.key_width(), 8);
    assert_eq!(DataType::Real.key_width(), 8);
    assert_eq!(DataType::Varchar(10).key_width(), 12);
    assert_eq!(DataType::Date.key_width(), 4);
    assert_eq!(DataType::Point.key_width(), 16);
}

#[test]
fn test_key_encoding_round_trips() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let cases = vec![
        (DataType::Integer, Value::Integer(-77)),
        (DataType::Real, Value::Real(2.5)),
        (DataType::Varchar(8), Value::Text("kunci".to_string())),
        (DataType::Date, Value::Date(date)),
        (DataType::Point, Value::Point(Point::new(-1.0, 4.25))),
    ];
    for (data_type, value) in cases {
        let bytes = data_type.encode_key_to_vec(&value).unwrap();
        assert_eq!(bytes.len(), data_type.key_width());
        assert_eq!(data_type.decode_key(&bytes).unwrap(), value);
    }
}

#[test]
fn test_key_encoding_rejects_wrong_types() {
    assert!(matches!(
        DataType::Integer.encode_key_to_vec(&Value::Text("1".to_string())),
        Err(DatabaseError::TypeMismatch { .. })
    ));
    assert!(DataType::Varchar(3).encode_key_to_vec(&Value::Text("long".to_string())).is_err());
    assert!(DataType::Date.encode_key_to_vec(&Value::Null).is_err());
}

#[test]
fn test_key_ordering() {
    assert_eq!(Value::Integer(5).key_cmp(&Value::Integer(10)), Ordering::Less);
    assert_eq!(Value::Real(-0.5).key_cmp(&Value::Real(-0.25)), Ordering::Less);
    assert_eq!(
        Value::Text("apple".to_string()).key_cmp(&Value::Text("banana".to_string())),
        Ordering::Less
    );
    let early = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    let late = Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
    assert_eq!(late.key_cmp(&early), Ordering::Greater);
    assert!(Value::Integer(1) < Value::Integer(2));
    assert_eq!(Value::Integer(1).partial_cmp(&Value::Real(1.0)), None);
}

#[test]
fn test_value_bytes_round_trip() {
    let values = vec![
        Value::Null,
        Value::Integer(i64::MIN),
        Value::Real(3.5),
        Value::Text("héllo".to_string()),
        Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
        Value::Point(Point::new(0.5, 0.25)),
    ];
    for value in values {
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), value.serialized_size());
        let (decoded, used) = Value::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(used, bytes.len());
    }
}

#[test]
fn test_truncated_value_bytes_fail() {
    let bytes = Value::Integer(7).to_bytes();
    assert!(Value::from_bytes(&bytes[..5]).is_err());
    assert!(Value::from_bytes(&[]).is_err());
    assert!(Value::from_bytes(&[99]).is_err());
}

#[test]
fn test_type_compatibility() {
    assert!(Value::Text("abc".to_string()).is_compatible_with_type(&DataType::Varchar(3)));
    assert!(!Value::Text("abcd".to_string()).is_compatible_with_type(&DataType::Varchar(3)));
    assert!(Value::Point(Point::new(0.0, 0.0)).is_compatible_with_type(&DataType::Point));
    assert!(!Value::Integer(1).is_compatible_with_type(&DataType::Real));
}

#[test]
fn test_point_distance() {
    let a = Point::new(0.0, 0.0);
    let b = Point::new(3.0, 4.0);
    assert_eq!(a.distance(&b), 5.0);
    assert_eq!(Value::Point(b).as_point(), Some(b));
    assert_eq!(Value::Integer(1).as_point(), None);
}
