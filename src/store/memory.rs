//! In-memory tabular store.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::store::{Predicate, Query, Row, RowCursor, Schema, TabularStore, Value};

#[derive(Debug, Clone)]
struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

/// Tabular store that keeps every table in memory.
///
/// Transactions are snapshot based: `begin_transaction` copies the table
/// map and `rollback` restores it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn run_query(&self, query: &Query) -> Result<(Vec<String>, Vec<Row>), StoreError> {
        let table = self.table(&query.table)?;
        let predicate = query.predicate.bind(&table.schema)?;
        let (names, offsets) = match &query.columns {
            None => (table.schema.names(), (0..table.schema.len()).collect::<Vec<_>>()),
            Some(columns) => {
                let offsets = columns
                    .iter()
                    .map(|c| table.schema.require_index(c))
                    .collect::<Result<Vec<_>, _>>()?;
                (columns.clone(), offsets)
            }
        };
        let rows = table
            .rows
            .iter()
            .filter(|row| predicate.matches(row))
            .map(|row| offsets.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok((names, rows))
    }
}

impl TabularStore for MemoryStore {
    fn create_table(&mut self, name: &str, schema: &Schema) -> Result<(), StoreError> {
        if self.tables.contains_key(name) {
            return Err(StoreError::TableExists(name.to_string()));
        }
        self.tables.insert(
            name.to_string(),
            Table {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table_if_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.remove(name).is_some())
    }

    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn schema(&self, name: &str) -> Result<Schema, StoreError> {
        Ok(self.table(name)?.schema.clone())
    }

    fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<usize, StoreError> {
        let target = self.table_mut(table)?;
        for row in &rows {
            target.schema.validate(table, row)?;
        }
        let inserted = rows.len();
        target.rows.extend(rows);
        Ok(inserted)
    }

    fn bulk_insert_from_query(&mut self, dest: &str, query: &Query) -> Result<usize, StoreError> {
        let (names, rows) = self.run_query(query)?;
        if self.table(dest)?.schema.names() != names {
            return Err(StoreError::IncompatibleSchemas {
                dest: dest.to_string(),
                source_table: query.table.clone(),
            });
        }
        self.insert_rows(dest, rows)
    }

    fn select(&self, query: &Query) -> Result<RowCursor, StoreError> {
        let (names, rows) = self.run_query(query)?;
        Ok(RowCursor::new(names, rows))
    }

    fn update(
        &mut self,
        table: &str,
        assignments: &[(&str, Value)],
        predicate: &Predicate,
    ) -> Result<usize, StoreError> {
        let target = self.table_mut(table)?;
        let bound = predicate.bind(&target.schema)?;
        let offsets = assignments
            .iter()
            .map(|(column, value)| Ok((target.schema.require_index(column)?, value.clone())))
            .collect::<Result<Vec<_>, StoreError>>()?;

        // Validate a candidate row so a bad assignment fails before any write.
        let mut candidate = target.schema.default_row();
        for (idx, value) in &offsets {
            candidate[*idx] = value.clone();
        }
        target.schema.validate(table, &candidate)?;

        let mut updated = 0;
        for row in target.rows.iter_mut().filter(|row| bound.matches(row)) {
            for (idx, value) in &offsets {
                row[*idx] = value.clone();
            }
            updated += 1;
        }
        Ok(updated)
    }

    fn delete(&mut self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        let target = self.table_mut(table)?;
        let bound = predicate.bind(&target.schema)?;
        let before = target.rows.len();
        target.rows.retain(|row| !bound.matches(row));
        Ok(before - target.rows.len())
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::Transaction("transaction already open"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or(StoreError::Transaction("commit without an open transaction"))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or(StoreError::Transaction("rollback without an open transaction"))?;
        self.tables = snapshot;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.table(table)?.rows.len())
    }

    fn count_where(&self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        let source = self.table(table)?;
        let bound = predicate.bind(&source.schema)?;
        Ok(source.rows.iter().filter(|row| bound.matches(row)).count())
    }
}
