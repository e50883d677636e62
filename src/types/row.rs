use serde::{Deserialize, Serialize};

use crate::types::{error::DatabaseError, value::Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get_value(&self, column_index: usize) -> Option<&Value> {
        self.values.get(column_index)
    }

    pub fn set_value(&mut self, column_index: usize, value: Value) -> Result<(), DatabaseError> {
        if column_index >= self.values.len() {
            return Err(DatabaseError::InvalidData {
                details: format!("Column index {} out of bounds", column_index),
            });
        }
        self.values[column_index] = value;
        Ok(())
    }

    pub fn size(&self) -> usize {
        // value_count (2 bytes) followed by the tagged values
        2 + self.values.iter().map(Value::serialized_size).sum::<usize>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.size());
        buffer.extend_from_slice(&(self.values.len() as u16).to_le_bytes());
        for value in &self.values {
            buffer.extend_from_slice(&value.to_bytes());
        }
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < 2 {
            return Err(DatabaseError::serialization("Incomplete value count"));
        }
        let value_count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let mut cursor = 2;

        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let (value, consumed) = Value::from_bytes(&bytes[cursor..])?;
            values.push(value);
            cursor += consumed;
        }

        if cursor != bytes.len() {
            return Err(DatabaseError::serialization(format!(
                "Row payload has {} trailing bytes",
                bytes.len() - cursor
            )));
        }

        Ok(Row { values })
    }
}
