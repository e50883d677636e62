use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page {page_id} (page count: {page_count})")]
    InvalidPage { page_id: PageId, page_count: u32 },

    #[error("Size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Duplicate key {key}")]
    DuplicateKey { key: String },

    #[error("Corrupt structure: {reason}")]
    CorruptStructure { reason: String },

    #[error("Operation '{operation}' is not supported by {index} index")]
    UnsupportedOperation { operation: String, index: String },

    #[error("Serialization/deserialization error: {details}")]
    SerializationError { details: String },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid data: {details}")]
    InvalidData { details: String },

    #[error("Record of {size} bytes does not fit in a page (capacity: {capacity})")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("Page store is closed")]
    StoreClosed,

    #[error("Table '{name}' not found")]
    TableNotFound { name: String },

    #[error("Table '{name}' already exists")]
    TableAlreadyExists { name: String },

    #[error("Column '{name}' not found in table '{table}'")]
    ColumnNotFound { name: String, table: String },

    #[error("No {kind} index on column '{column}'")]
    IndexNotFound { column: String, kind: String },

    #[error("Column '{column}' already has a {kind} index")]
    IndexAlreadyExists { column: String, kind: String },
}

impl DatabaseError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        DatabaseError::CorruptStructure {
            reason: reason.into(),
        }
    }

    pub fn serialization(details: impl Into<String>) -> Self {
        DatabaseError::SerializationError {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
