//! SQLite-backed tabular store.
//!
//! Every table is a real SQLite table. Its [`Schema`] (column types and
//! defaults) is kept as JSON in a catalog table so it comes back exactly
//! as created. Predicates are rendered with `?` placeholders and their
//! literals are bound as parameters.

use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::predicate::quote_ident;
use crate::store::{ColumnType, Predicate, Query, Row, RowCursor, Schema, TabularStore, Value};

const CATALOG: &str = "resift_schema";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_sql(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Int => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text => "TEXT",
    }
}

fn column_list(names: &[String]) -> String {
    names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", ")
}

/// Tabular store on a SQLite database file.
///
/// Transactions map onto `BEGIN`/`COMMIT`/`ROLLBACK`. Outside an explicit
/// transaction every mutating call runs in its own.
#[derive(Debug)]
pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(path, flags)?;
        debug!(path = %path.display(), "opened sqlite store");
        Self::init(connection)
    }

    /// A private database that lives as long as the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {CATALOG} (name TEXT PRIMARY KEY, schema TEXT NOT NULL)"
        ))?;
        Ok(Self { connection })
    }

    /// Run `work` inside the open transaction, or inside a fresh one that
    /// commits on success.
    fn atomic<T>(
        &mut self,
        work: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if !self.connection.is_autocommit() {
            return work(&self.connection);
        }
        let transaction = self.connection.transaction()?;
        let out = work(&transaction)?;
        transaction.commit()?;
        Ok(out)
    }

    fn projection(schema: &Schema, query: &Query) -> Result<Vec<String>, StoreError> {
        match &query.columns {
            None => Ok(schema.names()),
            Some(columns) => {
                for column in columns {
                    schema.require_index(column)?;
                }
                Ok(columns.clone())
            }
        }
    }

    /// `SELECT ... FROM ... WHERE ...` text and its parameters.
    fn select_sql(&self, query: &Query) -> Result<(Vec<String>, String, Vec<Value>), StoreError> {
        let schema = self.schema(&query.table)?;
        let names = Self::projection(&schema, query)?;
        let (condition, params) = query.predicate.bind(&schema)?.to_sql(&schema);
        let sql = format!(
            "SELECT {} FROM {} WHERE {condition} ORDER BY rowid",
            column_list(&names),
            quote_ident(&query.table)
        );
        Ok((names, sql, params))
    }
}

impl TabularStore for SqliteStore {
    fn create_table(&mut self, name: &str, schema: &Schema) -> Result<(), StoreError> {
        if self.table_exists(name) {
            return Err(StoreError::TableExists(name.to_string()));
        }
        let encoded = serde_json::to_string(schema).map_err(|source| StoreError::Catalog {
            table: name.to_string(),
            source,
        })?;
        let columns = schema
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(c.column_type)))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!("CREATE TABLE {} ({columns})", quote_ident(name));
        self.atomic(|conn| {
            conn.execute(&ddl, ())?;
            conn.execute(
                &format!("INSERT INTO {CATALOG} (name, schema) VALUES (?1, ?2)"),
                (name, encoded.as_str()),
            )?;
            Ok(())
        })
    }

    fn drop_table_if_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        if !self.table_exists(name) {
            return Ok(false);
        }
        let ddl = format!("DROP TABLE {}", quote_ident(name));
        self.atomic(|conn| {
            conn.execute(&ddl, ())?;
            conn.execute(&format!("DELETE FROM {CATALOG} WHERE name = ?1"), (name,))?;
            Ok(true)
        })
    }

    fn table_exists(&self, name: &str) -> bool {
        let found = self
            .connection
            .query_row(
                &format!("SELECT 1 FROM {CATALOG} WHERE name = ?1"),
                (name,),
                |_| Ok(()),
            )
            .optional();
        match found {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(table = name, %err, "catalog lookup failed");
                false
            }
        }
    }

    fn schema(&self, name: &str) -> Result<Schema, StoreError> {
        let encoded: Option<String> = self
            .connection
            .query_row(
                &format!("SELECT schema FROM {CATALOG} WHERE name = ?1"),
                (name,),
                |row| row.get(0),
            )
            .optional()?;
        let encoded = encoded.ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        serde_json::from_str(&encoded).map_err(|source| StoreError::Catalog {
            table: name.to_string(),
            source,
        })
    }

    fn list_tables(&self) -> Vec<String> {
        let listed = self
            .connection
            .prepare(&format!("SELECT name FROM {CATALOG} ORDER BY name"))
            .and_then(|mut stmt| {
                let names = stmt
                    .query_map((), |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>();
                names
            });
        listed.unwrap_or_else(|err| {
            warn!(%err, "cannot list tables");
            Vec::new()
        })
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<usize, StoreError> {
        let schema = self.schema(table)?;
        for row in &rows {
            schema.validate(table, row)?;
        }
        let placeholders = vec!["?"; schema.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(table),
            column_list(&schema.names())
        );
        self.atomic(|conn| {
            let mut insert = conn.prepare(&sql)?;
            for row in &rows {
                insert.execute(params_from_iter(row.iter()))?;
            }
            Ok(rows.len())
        })
    }

    fn bulk_insert_from_query(&mut self, dest: &str, query: &Query) -> Result<usize, StoreError> {
        let dest_schema = self.schema(dest)?;
        let source_schema = self.schema(&query.table)?;
        let names = Self::projection(&source_schema, query)?;
        let incompatible = || StoreError::IncompatibleSchemas {
            dest: dest.to_string(),
            source_table: query.table.clone(),
        };
        if dest_schema.names() != names {
            return Err(incompatible());
        }
        for (target, name) in dest_schema.columns().iter().zip(&names) {
            let source = &source_schema.columns()[source_schema.require_index(name)?];
            let fits = target.column_type == source.column_type
                || (target.column_type == ColumnType::Float && source.column_type == ColumnType::Int);
            if !fits {
                return Err(incompatible());
            }
        }

        let (_, select, params) = self.select_sql(query)?;
        let sql = format!("INSERT INTO {} ({}) {select}", quote_ident(dest), column_list(&names));
        self.atomic(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
    }

    fn select(&self, query: &Query) -> Result<RowCursor, StoreError> {
        let (names, sql, params) = self.select_sql(query)?;
        let width = names.len();
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..width).map(|i| row.get_ref(i).map(from_sql)).collect()
            })?
            .collect::<rusqlite::Result<Vec<Row>>>()?;
        Ok(RowCursor::new(names, rows))
    }

    fn update(
        &mut self,
        table: &str,
        assignments: &[(&str, Value)],
        predicate: &Predicate,
    ) -> Result<usize, StoreError> {
        let schema = self.schema(table)?;
        let bound = predicate.bind(&schema)?;

        // Validate a row carrying the new values before anything is written.
        let mut candidate = schema.default_row();
        for (column, value) in assignments {
            candidate[schema.require_index(column)?] = value.clone();
        }
        schema.validate(table, &candidate)?;
        if assignments.is_empty() {
            return self.count_where(table, predicate);
        }

        let set = assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_ident(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let (condition, where_params) = bound.to_sql(&schema);
        let params: Vec<Value> = assignments
            .iter()
            .map(|(_, value)| value.clone())
            .chain(where_params)
            .collect();
        let sql = format!("UPDATE {} SET {set} WHERE {condition}", quote_ident(table));
        self.atomic(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
    }

    fn delete(&mut self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        let schema = self.schema(table)?;
        let (condition, params) = predicate.bind(&schema)?.to_sql(&schema);
        let sql = format!("DELETE FROM {} WHERE {condition}", quote_ident(table));
        self.atomic(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.in_transaction() {
            return Err(StoreError::Transaction("transaction already open"));
        }
        self.connection.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("commit without an open transaction"));
        }
        self.connection.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("rollback without an open transaction"));
        }
        self.connection.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        self.count_where(table, &Predicate::True)
    }

    fn count_where(&self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        let schema = self.schema(table)?;
        let (condition, params) = predicate.bind(&schema)?.to_sql(&schema);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {condition}", quote_ident(table));
        let count: i64 = self
            .connection
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{col, ColumnSpec};

    fn snp_schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::new("chrom", ColumnType::Text),
            ColumnSpec::new("pos", ColumnType::Int),
            ColumnSpec::new("score", ColumnType::Float).with_default(0.5),
        ])
    }

    fn seeded() -> SqliteStore {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_table("snp", &snp_schema()).unwrap();
        store
            .insert_rows(
                "snp",
                vec![
                    vec!["chr1".into(), Value::Int(10), Value::Float(1.5)],
                    vec!["chr1".into(), Value::Int(20), Value::Null],
                    vec!["chr2".into(), Value::Int(10), Value::Float(3.0)],
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn schema_round_trips_through_the_catalog() {
        let store = seeded();
        assert_eq!(store.schema("snp").unwrap(), snp_schema());
        assert_eq!(store.list_tables(), vec!["snp".to_string()]);
        assert!(matches!(store.schema("nope"), Err(StoreError::TableNotFound(_))));
    }

    #[test]
    fn create_twice_fails() {
        let mut store = seeded();
        assert!(matches!(
            store.create_table("snp", &snp_schema()),
            Err(StoreError::TableExists(_))
        ));
    }

    #[test]
    fn select_projects_and_filters_in_insertion_order() {
        let store = seeded();
        let rows: Vec<Row> = store
            .select(&Query::table("snp").columns(&["pos"]).filter(col("chrom").eq("chr1")))
            .unwrap()
            .collect();
        assert_eq!(rows, vec![vec![Value::Int(10)], vec![Value::Int(20)]]);
    }

    #[test]
    fn null_comparisons_match_memory_semantics() {
        let store = seeded();
        assert_eq!(store.count_where("snp", &col("score").ge(0.0)).unwrap(), 2);
        assert_eq!(
            store.count_where("snp", &Predicate::not(col("score").ge(0.0))).unwrap(),
            1
        );
        assert_eq!(store.count_where("snp", &Predicate::is_null("score")).unwrap(), 1);
    }

    #[test]
    fn quotes_in_literals_are_data() {
        let store = seeded();
        let hostile = col("chrom").eq("chr1' OR '1'='1");
        assert_eq!(store.count_where("snp", &hostile).unwrap(), 0);
    }

    #[test]
    fn update_validates_before_writing() {
        let mut store = seeded();
        let err = store
            .update("snp", &[("pos", Value::from("x"))], &Predicate::True)
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        let updated = store
            .update("snp", &[("pos", Value::Int(11))], &col("pos").eq(10i64))
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.count_where("snp", &col("pos").eq(11i64)).unwrap(), 2);
    }

    #[test]
    fn insert_from_query_requires_matching_columns() {
        let mut store = seeded();
        store.create_table("copy", &snp_schema()).unwrap();
        let copied = store
            .bulk_insert_from_query("copy", &Query::table("snp").filter(col("pos").eq(10i64)))
            .unwrap();
        assert_eq!(copied, 2);
        assert_eq!(store.row_count("copy").unwrap(), 2);

        let err = store
            .bulk_insert_from_query("copy", &Query::table("snp").columns(&["pos"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleSchemas { .. }));
    }

    #[test]
    fn rollback_restores_tables_and_catalog() {
        let mut store = seeded();
        store.begin_transaction().unwrap();
        assert!(store.begin_transaction().is_err());
        store.delete("snp", &Predicate::True).unwrap();
        store.drop_table_if_exists("snp").unwrap();
        assert!(!store.table_exists("snp"));
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        assert_eq!(store.row_count("snp").unwrap(), 3);
        assert!(store.commit().is_err());
    }

    #[test]
    fn reopened_file_keeps_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.create_table("snp", &snp_schema()).unwrap();
            store
                .insert_rows("snp", vec![vec!["chr1".into(), Value::Int(1), Value::Float(2.0)]])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let rows: Vec<Row> = store.select(&Query::table("snp")).unwrap().collect();
        assert_eq!(rows, vec![vec!["chr1".into(), Value::Int(1), Value::Float(2.0)]]);
    }
}
