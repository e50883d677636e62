use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    config::DefaultIndexPolicy,
    index::IndexKind,
    types::{
        DEFAULT_PAGE_SIZE,
        error::DatabaseError,
        row::Row,
        value::{DataType, Value},
    },
};

/// Represents a column definition in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub position: usize,
    pub nullable: bool,
    pub default_value: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
    /// Index kinds declared on this column, in creation order.
    pub indexes: Vec<IndexKind>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, position: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            position,
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
            indexes: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_index(mut self, kind: IndexKind) -> Self {
        if !self.indexes.contains(&kind) {
            self.indexes.push(kind);
        }
        self
    }

    /// Whether indexes on this column reject duplicate keys.
    pub fn is_unique(&self) -> bool {
        self.unique || self.primary_key
    }

    /// Columns the default index policy considers worth an ordered tree.
    pub fn is_index_candidate(&self) -> bool {
        if !IndexKind::Ordered.supports(&self.data_type) {
            return false;
        }
        self.is_unique()
            || matches!(
                self.data_type,
                DataType::Integer | DataType::Real | DataType::Date
            )
    }
}

/// Represents a complete table schema with all column definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    /// Page size of the table's heap file.
    pub page_size: usize,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut ColumnSchema> {
        self.columns.iter_mut().find(|col| col.name == name)
    }

    /// Get column by position
    pub fn get_column_by_position(&self, position: usize) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.position == position)
    }

    /// Checks names, positions and declared index kinds.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.table_name.is_empty()
            || !self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DatabaseError::InvalidData {
                details: format!("Invalid table name '{}'", self.table_name),
            });
        }
        if self.columns.is_empty() {
            return Err(DatabaseError::InvalidData {
                details: format!("Table '{}' has no columns", self.table_name),
            });
        }

        let mut names = HashSet::new();
        for (i, column) in self.columns.iter().enumerate() {
            if !names.insert(column.name.as_str()) {
                return Err(DatabaseError::InvalidData {
                    details: format!("Duplicate column '{}'", column.name),
                });
            }
            if column.position != i {
                return Err(DatabaseError::InvalidData {
                    details: format!(
                        "Column '{}' has position {} but is declared at {}",
                        column.name, column.position, i
                    ),
                });
            }
            for (k, kind) in column.indexes.iter().enumerate() {
                if column.indexes[..k].contains(kind) {
                    return Err(DatabaseError::InvalidData {
                        details: format!("Column '{}' declares the {} index twice", column.name, kind),
                    });
                }
                if !kind.supports(&column.data_type) {
                    return Err(DatabaseError::TypeMismatch {
                        expected: format!("a key type supported by the {} index", kind),
                        actual: column.data_type.to_string(),
                    });
                }
            }
            if let Some(default) = &column.default_value {
                if !default.is_null() && !default.is_compatible_with_type(&column.data_type) {
                    return Err(DatabaseError::TypeMismatch {
                        expected: column.data_type.to_string(),
                        actual: default.type_name(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate a row against this schema
    pub fn validate_row(&self, row: &Row) -> Result<(), DatabaseError> {
        // Check column count
        if row.values.len() != self.columns.len() {
            return Err(DatabaseError::InvalidData {
                details: format!(
                    "Row has {} values but table '{}' expects {} columns",
                    row.values.len(),
                    self.table_name,
                    self.columns.len()
                ),
            });
        }

        // Validate each column
        for (i, value) in row.values.iter().enumerate() {
            if let Some(column) = self.get_column_by_position(i) {
                // Check null constraints
                if !column.nullable && value.is_null() {
                    return Err(DatabaseError::InvalidData {
                        details: format!("Column '{}' cannot be NULL", column.name),
                    });
                }

                // Check data type compatibility
                if !value.is_null() && !value.is_compatible_with_type(&column.data_type) {
                    return Err(DatabaseError::TypeMismatch {
                        expected: format!("{} for column '{}'", column.data_type, column.name),
                        actual: value.type_name(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Apply default values to a row where values are missing or null
    pub fn apply_defaults(&self, row: &mut Row) {
        // Extend row if it has fewer values than columns
        while row.values.len() < self.columns.len() {
            row.values.push(Value::Null);
        }

        for column in &self.columns {
            if let Some(default_value) = &column.default_value {
                if row.values.len() > column.position && row.values[column.position].is_null() {
                    row.values[column.position] = default_value.clone();
                }
            }
        }
    }

    /// Ordered-tree indexes the policy would add, as `(column, kind)` pairs.
    pub fn suggest_indexes(&self, policy: DefaultIndexPolicy) -> Vec<(String, IndexKind)> {
        self.columns
            .iter()
            .filter(|col| col.is_index_candidate())
            .filter(|col| match policy {
                DefaultIndexPolicy::Off => false,
                DefaultIndexPolicy::FillMissing => col.indexes.is_empty(),
                DefaultIndexPolicy::Always => !col.indexes.contains(&IndexKind::Ordered),
            })
            .map(|col| (col.name.clone(), IndexKind::Ordered))
            .collect()
    }

    /// Adds the suggested indexes to the column declarations.
    pub fn apply_index_policy(&mut self, policy: DefaultIndexPolicy) {
        for (name, kind) in self.suggest_indexes(policy) {
            if let Some(column) = self.get_column_mut(&name) {
                column.indexes.push(kind);
            }
        }
    }
}
