//! Table schemas and rows.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::value::Value;

/// One table row; cells are ordered as the table's columns.
pub type Row = Vec<Value>;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit integer.
    Int,
    /// 64-bit float; also accepts integers.
    Float,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Float, Value::Int(_))
                | (ColumnType::Text, Value::Text(_))
        )
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, matched case-sensitively.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
    /// Value used when a row omits the column.
    pub default: Value,
}

impl ColumnSpec {
    /// Nullable column without a default.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            default: Value::Null,
        }
    }

    /// Set the column default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Build a schema from column definitions.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Column definitions in order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Offset of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Offset of `name`, or an unknown-column error.
    pub fn require_index(&self, name: &str) -> Result<usize, StoreError> {
        self.index_of(name).ok_or_else(|| StoreError::UnknownColumn {
            column: name.to_string(),
        })
    }

    /// A row holding every column default.
    pub fn default_row(&self) -> Row {
        self.columns.iter().map(|c| c.default.clone()).collect()
    }

    /// Check arity and cell types of `row`.
    pub fn validate(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        if row.len() != self.columns.len() {
            return Err(StoreError::ArityMismatch {
                table: table.to_string(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (spec, value) in self.columns.iter().zip(row) {
            if !spec.column_type.admits(value) {
                return Err(StoreError::TypeMismatch {
                    table: table.to_string(),
                    column: spec.name.clone(),
                    expected: spec.column_type,
                    actual: value.type_name(),
                });
            }
        }
        Ok(())
    }
}
