use std::{cmp::Ordering, fmt};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::error::DatabaseError;

// Type discriminants shared by row payloads and index headers
const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_REAL: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_DATE: u8 = 5;
const TAG_POINT: u8 = 6;

/// A 2-D point, the key type of spatial indexes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Column types. Every type doubles as an index key type with a fixed
/// on-page width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Varchar(u16),
    Date,
    Point,
}

impl DataType {
    pub fn from_string(type_str: &str) -> Result<Self, DatabaseError> {
        let upper = type_str.trim().to_uppercase();
        match upper.as_str() {
            "INTEGER" | "INT" => Ok(DataType::Integer),
            "REAL" | "FLOAT" => Ok(DataType::Real),
            "DATE" => Ok(DataType::Date),
            "POINT" | "ARRAY_FLOAT" => Ok(DataType::Point),
            _ => {
                if let Some(rest) = upper
                    .strip_prefix("VARCHAR(")
                    .and_then(|r| r.strip_suffix(')'))
                {
                    let length = rest.trim().parse::<u16>().map_err(|_| {
                        DatabaseError::InvalidData {
                            details: format!("Invalid VARCHAR length in '{}'", type_str),
                        }
                    })?;
                    return Ok(DataType::Varchar(length));
                }
                Err(DatabaseError::InvalidData {
                    details: format!("Unknown data type '{}'", type_str),
                })
            }
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            DataType::Integer => TAG_INTEGER,
            DataType::Real => TAG_REAL,
            DataType::Varchar(_) => TAG_TEXT,
            DataType::Date => TAG_DATE,
            DataType::Point => TAG_POINT,
        }
    }

    pub fn from_tag(tag: u8, width: u16) -> Result<Self, DatabaseError> {
        match tag {
            TAG_INTEGER => Ok(DataType::Integer),
            TAG_REAL => Ok(DataType::Real),
            TAG_TEXT => Ok(DataType::Varchar(width)),
            TAG_DATE => Ok(DataType::Date),
            TAG_POINT => Ok(DataType::Point),
            _ => Err(DatabaseError::corrupt(format!("Unknown key type tag {}", tag))),
        }
    }

    /// Declared length for VARCHAR, 0 for the fixed types.
    pub fn length(&self) -> u16 {
        match self {
            DataType::Varchar(n) => *n,
            _ => 0,
        }
    }

    /// Bytes one key of this type occupies inside an index page.
    pub fn key_width(&self) -> usize {
        match self {
            DataType::Integer | DataType::Real => 8,
            DataType::Varchar(n) => 2 + *n as usize,
            DataType::Date => 4,
            DataType::Point => 16,
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, DataType::Point)
    }

    /// Rejects values that cannot be stored as keys of this type.
    pub fn check_key(&self, value: &Value) -> Result<(), DatabaseError> {
        if value.is_compatible_with_type(self) {
            Ok(())
        } else {
            Err(DatabaseError::TypeMismatch {
                expected: self.to_string(),
                actual: value.type_name(),
            })
        }
    }

    /// Fixed-width key encoding; VARCHAR keys are length-prefixed and
    /// zero-padded to the declared length.
    pub fn encode_key(&self, value: &Value, buf: &mut [u8]) -> Result<(), DatabaseError> {
        self.check_key(value)?;
        let width = self.key_width();
        if buf.len() < width {
            return Err(DatabaseError::SizeMismatch {
                expected: width,
                actual: buf.len(),
            });
        }
        buf[..width].fill(0);
        match value {
            Value::Integer(i) => buf[0..8].copy_from_slice(&i.to_le_bytes()),
            Value::Real(r) => buf[0..8].copy_from_slice(&r.to_le_bytes()),
            Value::Text(s) => {
                let bytes = s.as_bytes();
                buf[0..2].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
                buf[2..2 + bytes.len()].copy_from_slice(bytes);
            }
            Value::Date(d) => buf[0..4].copy_from_slice(&d.num_days_from_ce().to_le_bytes()),
            Value::Point(p) => {
                buf[0..8].copy_from_slice(&p.x.to_le_bytes());
                buf[8..16].copy_from_slice(&p.y.to_le_bytes());
            }
            Value::Null => unreachable!("check_key rejects NULL"),
        }
        Ok(())
    }

    pub fn encode_key_to_vec(&self, value: &Value) -> Result<Vec<u8>, DatabaseError> {
        let mut buf = vec![0u8; self.key_width()];
        self.encode_key(value, &mut buf)?;
        Ok(buf)
    }

    pub fn decode_key(&self, bytes: &[u8]) -> Result<Value, DatabaseError> {
        let width = self.key_width();
        if bytes.len() < width {
            return Err(DatabaseError::corrupt(format!(
                "Key needs {} bytes, got {}",
                width,
                bytes.len()
            )));
        }
        let value = match self {
            DataType::Integer => Value::Integer(i64::from_le_bytes(read_8(bytes, 0))),
            DataType::Real => Value::Real(f64::from_le_bytes(read_8(bytes, 0))),
            DataType::Varchar(n) => {
                let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
                if len > *n as usize {
                    return Err(DatabaseError::corrupt(format!(
                        "VARCHAR key length {} exceeds declared {}",
                        len, n
                    )));
                }
                let text = String::from_utf8(bytes[2..2 + len].to_vec())
                    .map_err(|_| DatabaseError::corrupt("Invalid UTF-8 in VARCHAR key"))?;
                Value::Text(text)
            }
            DataType::Date => {
                let days = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let date = NaiveDate::from_num_days_from_ce_opt(days)
                    .ok_or_else(|| DatabaseError::corrupt(format!("Invalid date key {}", days)))?;
                Value::Date(date)
            }
            DataType::Point => Value::Point(Point::new(
                f64::from_le_bytes(read_8(bytes, 0)),
                f64::from_le_bytes(read_8(bytes, 8)),
            )),
        };
        Ok(value)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Real => write!(f, "REAL"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Point => write!(f, "POINT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Point(Point),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(_) => "INTEGER".to_string(),
            Value::Real(_) => "REAL".to_string(),
            Value::Text(s) => format!("VARCHAR({})", s.len()),
            Value::Date(_) => "DATE".to_string(),
            Value::Point(_) => "POINT".to_string(),
        }
    }

    pub fn is_compatible_with_type(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Integer(_), DataType::Integer) => true,
            (Value::Real(_), DataType::Real) => true,
            (Value::Text(s), DataType::Varchar(n)) => s.len() <= *n as usize,
            (Value::Date(_), DataType::Date) => true,
            (Value::Point(_), DataType::Point) => true,
            _ => false,
        }
    }

    pub fn as_point(&self) -> Option<Point> {
        match self {
            Value::Point(p) => Some(*p),
            _ => None,
        }
    }

    /// Total order used by every ordered index. Values of different types
    /// order by type tag, which only matters for NULL in practice since
    /// indexes are typed.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Point(a), Value::Point(b)) => {
                a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y))
            }
            _ => self.tag().cmp(&other.tag()),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Value::Null => TAG_NULL,
            Value::Integer(_) => TAG_INTEGER,
            Value::Real(_) => TAG_REAL,
            Value::Text(_) => TAG_TEXT,
            Value::Date(_) => TAG_DATE,
            Value::Point(_) => TAG_POINT,
        }
    }

    pub fn serialized_size(&self) -> usize {
        1 + match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 8,
            Value::Text(s) => 4 + s.len(),
            Value::Date(_) => 4,
            Value::Point(_) => 16,
        }
    }

    /// Tagged, variable-width encoding used inside row payloads.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.serialized_size());
        buffer.push(self.tag());
        match self {
            Value::Null => {}
            Value::Integer(i) => buffer.extend_from_slice(&i.to_le_bytes()),
            Value::Real(r) => buffer.extend_from_slice(&r.to_le_bytes()),
            Value::Text(s) => {
                buffer.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buffer.extend_from_slice(s.as_bytes());
            }
            Value::Date(d) => buffer.extend_from_slice(&d.num_days_from_ce().to_le_bytes()),
            Value::Point(p) => {
                buffer.extend_from_slice(&p.x.to_le_bytes());
                buffer.extend_from_slice(&p.y.to_le_bytes());
            }
        }
        buffer
    }

    /// Decodes one value from the front of `bytes`, returning it with the
    /// number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DatabaseError> {
        if bytes.is_empty() {
            return Err(DatabaseError::serialization("Empty value bytes"));
        }
        let need = |n: usize| -> Result<(), DatabaseError> {
            if bytes.len() < 1 + n {
                Err(DatabaseError::serialization(format!(
                    "Insufficient bytes for value type {}: expected {}, got {}",
                    bytes[0],
                    1 + n,
                    bytes.len()
                )))
            } else {
                Ok(())
            }
        };
        match bytes[0] {
            TAG_NULL => Ok((Value::Null, 1)),
            TAG_INTEGER => {
                need(8)?;
                Ok((Value::Integer(i64::from_le_bytes(read_8(bytes, 1))), 9))
            }
            TAG_REAL => {
                need(8)?;
                Ok((Value::Real(f64::from_le_bytes(read_8(bytes, 1))), 9))
            }
            TAG_TEXT => {
                need(4)?;
                let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
                need(4 + len)?;
                let text = String::from_utf8(bytes[5..5 + len].to_vec())
                    .map_err(|_| DatabaseError::serialization("Invalid UTF-8 in Text value"))?;
                Ok((Value::Text(text), 5 + len))
            }
            TAG_DATE => {
                need(4)?;
                let days = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                let date = NaiveDate::from_num_days_from_ce_opt(days).ok_or_else(|| {
                    DatabaseError::serialization(format!("Invalid date {}", days))
                })?;
                Ok((Value::Date(date), 5))
            }
            TAG_POINT => {
                need(16)?;
                let point = Point::new(
                    f64::from_le_bytes(read_8(bytes, 1)),
                    f64::from_le_bytes(read_8(bytes, 9)),
                );
                Ok((Value::Point(point), 17))
            }
            other => Err(DatabaseError::serialization(format!(
                "Unknown type discriminant: {}",
                other
            ))),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.tag() == other.tag() {
            Some(self.key_cmp(other))
        } else {
            None // Mixed types
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Point(p) => write!(f, "({}, {})", p.x, p.y),
        }
    }
}

fn read_8(bytes: &[u8], at: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[at..at + 8]);
    out
}
