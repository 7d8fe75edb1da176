//! Tabular store boundary.
//!
//! Filter stages see the store only through [`TabularStore`]: table DDL,
//! bulk inserts, filtered selects, updates, deletes and explicit transaction
//! boundaries. Predicates are typed values ([`Predicate`]) bound to the
//! table schema, so no query text is ever assembled from row data.
//!
//! [`SqliteStore`] is the on-disk backend; [`MemoryStore`] keeps tables in
//! memory and serves as the test double.

mod memory;
mod predicate;
mod schema;
mod sqlite;
mod value;

pub use memory::MemoryStore;
pub use predicate::{col, BoundPredicate, CmpOp, Expr, Predicate};
pub use schema::{ColumnSpec, ColumnType, Row, Schema};
pub use sqlite::SqliteStore;
pub use value::Value;

use crate::error::StoreError;

/// A filtered projection of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Source table.
    pub table: String,
    /// Projected columns; `None` selects every column in schema order.
    pub columns: Option<Vec<String>>,
    /// Row filter.
    pub predicate: Predicate,
}

impl Query {
    /// Select every row and column of `table`.
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: None,
            predicate: Predicate::True,
        }
    }

    /// Restrict the projection to `columns`.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Restrict rows to those matching `predicate`.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }
}

/// Result rows of a select, in table order.
#[derive(Debug)]
pub struct RowCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor {
    /// Wrap materialized rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    /// Projected column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// The narrow relational interface the pipeline depends on.
pub trait TabularStore: Send {
    /// Create an empty table; fails if it already exists.
    fn create_table(&mut self, name: &str, schema: &Schema) -> Result<(), StoreError>;

    /// Drop a table if present, returning whether it existed.
    fn drop_table_if_exists(&mut self, name: &str) -> Result<bool, StoreError>;

    /// Whether a table exists.
    fn table_exists(&self, name: &str) -> bool;

    /// Schema of an existing table.
    fn schema(&self, name: &str) -> Result<Schema, StoreError>;

    /// Names of all tables, sorted.
    fn list_tables(&self) -> Vec<String>;

    /// Append rows; every row is validated against the schema.
    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<usize, StoreError>;

    /// `INSERT INTO dest SELECT ...`; returns the number of inserted rows.
    fn bulk_insert_from_query(&mut self, dest: &str, query: &Query) -> Result<usize, StoreError>;

    /// Filtered select.
    fn select(&self, query: &Query) -> Result<RowCursor, StoreError>;

    /// `UPDATE table SET ... WHERE ...`; returns the number of updated rows.
    fn update(
        &mut self,
        table: &str,
        assignments: &[(&str, Value)],
        predicate: &Predicate,
    ) -> Result<usize, StoreError>;

    /// `DELETE FROM table WHERE ...`; returns the number of deleted rows.
    fn delete(&mut self, table: &str, predicate: &Predicate) -> Result<usize, StoreError>;

    /// Open a transaction; nested transactions are rejected.
    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    /// Make the open transaction's changes permanent.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every change since `begin_transaction`.
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Number of rows in `table`.
    fn row_count(&self, table: &str) -> Result<usize, StoreError>;

    /// Number of rows in `table` matching `predicate`.
    fn count_where(&self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        Ok(self
            .select(&Query::table(table).filter(predicate.clone()))?
            .count())
    }
}
