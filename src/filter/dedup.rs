use std::collections::HashSet;

use tracing::info;

use crate::error::Result;
use crate::filter::atomically;
use crate::store::{Predicate, Query, Row, TabularStore};

fn scratch_name(table: &str) -> String {
    format!("{table}__distinct")
}

/// Collapse identical rows of `table` in place, keeping first occurrences in
/// order. Returns the number of rows removed.
///
/// Rows are staged in a scratch table so the original is truncated and
/// reloaded inside a single transaction.
pub fn distinct(store: &mut dyn TabularStore, table: &str) -> Result<usize> {
    let schema = store.schema(table)?;
    let rows: Vec<Row> = store.select(&Query::table(table))?.collect();
    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<Row> = rows.into_iter().filter(|row| seen.insert(row.clone())).collect();
    let removed = before - unique.len();
    if removed == 0 {
        return Ok(0);
    }

    let scratch = scratch_name(table);
    atomically(store, |store| {
        store.drop_table_if_exists(&scratch)?;
        store.create_table(&scratch, &schema)?;
        store.insert_rows(&scratch, unique)?;
        store.delete(table, &Predicate::True)?;
        store.bulk_insert_from_query(table, &Query::table(&scratch))?;
        store.drop_table_if_exists(&scratch)?;
        Ok(())
    })?;
    info!(table, removed, kept = before - removed, "removed duplicate rows");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{keys, site_table};
    use crate::site::fixtures::site;
    use crate::store::MemoryStore;

    #[test]
    fn removes_exact_duplicates_only() {
        let mut store = MemoryStore::new();
        let a = site("chr1", 1, 5, 5, 30.0);
        let b = site("chr1", 2, 5, 5, 30.0);
        let mut a_variant = a.clone();
        a_variant.quality = 31.0;
        site_table(&mut store, "t", &[a.clone(), b.clone(), a.clone(), a_variant, b]);

        assert_eq!(distinct(&mut store, "t").unwrap(), 2);
        assert_eq!(
            keys(&store, "t"),
            vec![("chr1".into(), 1), ("chr1".into(), 2), ("chr1".into(), 1)]
        );
        assert!(!store.table_exists(&scratch_name("t")));
        assert_eq!(distinct(&mut store, "t").unwrap(), 0);
    }

    #[test]
    fn missing_table_is_an_error() {
        let mut store = MemoryStore::new();
        assert!(distinct(&mut store, "nope").is_err());
    }
}
