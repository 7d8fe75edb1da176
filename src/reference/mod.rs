//! Reference annotation tables and their in-memory lookup indexes.
//!
//! Reference tables (known SNPs, repeat annotations, gene models, known
//! editing sites) are loaded into the store once and read by stages through
//! these indexes. Every index keys chromosomes by [`ChromKey`], so a `chr`
//! prefix mismatch between a sample and a reference never drops a match.

mod interval;

pub use interval::{BoundaryIndex, Interval, IntervalIndex, IntervalIndexBuilder};

use std::collections::HashSet;

use crate::error::{FilterError, Result};
use crate::site::SiteKey;
use crate::store::{ColumnSpec, ColumnType, Query, Schema, TabularStore};

/// Repeat class that is retained (and flagged) by the repeat-region stage.
pub const ALU_TYPE: &str = "SINE/Alu";

/// Gene-model feature type whose boundaries define splice junctions.
pub const CDS_TYPE: &str = "CDS";

/// Known SNP table: `chrom, pos`.
pub fn known_snp_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::new("chrom", ColumnType::Text),
        ColumnSpec::new("pos", ColumnType::Int),
    ])
}

/// Interval annotation table (repeats, gene models): `chrom, begin, end, type`.
pub fn interval_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::new("chrom", ColumnType::Text),
        ColumnSpec::new("begin", ColumnType::Int),
        ColumnSpec::new("end", ColumnType::Int),
        ColumnSpec::new("type", ColumnType::Text),
    ])
}

/// Known RNA-editing table: `chrom, coordinate, inchr, inrna`.
pub fn known_editing_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::new("chrom", ColumnType::Text),
        ColumnSpec::new("coordinate", ColumnType::Int),
        ColumnSpec::new("inchr", ColumnType::Text),
        ColumnSpec::new("inrna", ColumnType::Text),
    ])
}

fn position(value: &crate::store::Value, table: &str) -> Result<u64> {
    value
        .as_i64()
        .filter(|p| *p >= 1)
        .map(|p| p as u64)
        .ok_or_else(|| FilterError::Data(format!("invalid coordinate {value} in '{table}'")))
}

/// Load the `(chrom, position)` keys of a table into a set.
pub fn load_site_set(
    store: &dyn TabularStore,
    table: &str,
    chrom_column: &str,
    position_column: &str,
) -> Result<HashSet<SiteKey>> {
    let cursor = store.select(&Query::table(table).columns(&[chrom_column, position_column]))?;
    let mut keys = HashSet::with_capacity(cursor.size_hint().0);
    for row in cursor {
        let chrom = row[0]
            .as_str()
            .ok_or_else(|| FilterError::Data(format!("missing chromosome in '{table}'")))?;
        keys.insert(SiteKey::new(chrom, position(&row[1], table)?));
    }
    Ok(keys)
}

/// Load an interval table, keeping rows accepted by `keep_type`.
pub fn load_intervals(
    store: &dyn TabularStore,
    table: &str,
    keep_type: impl Fn(&str) -> bool,
) -> Result<IntervalIndex> {
    let cursor = store.select(&Query::table(table).columns(&["chrom", "begin", "end", "type"]))?;
    let mut index = IntervalIndex::builder();
    for row in cursor {
        let kind = row[3].as_str().unwrap_or_default();
        if !keep_type(kind) {
            continue;
        }
        let chrom = row[0]
            .as_str()
            .ok_or_else(|| FilterError::Data(format!("missing chromosome in '{table}'")))?;
        let begin = position(&row[1], table)?;
        let end = position(&row[2], table)?;
        if end < begin {
            return Err(FilterError::Data(format!(
                "interval {chrom}:{begin}-{end} in '{table}' ends before it begins"
            )));
        }
        index.push(chrom, Interval::new(begin, end, kind));
    }
    Ok(index.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Value};

    #[test]
    fn site_set_ignores_prefix() {
        let mut store = MemoryStore::new();
        store.create_table("snp", &known_snp_schema()).unwrap();
        store
            .insert_rows("snp", vec![vec!["1".into(), Value::Int(100)]])
            .unwrap();
        let keys = load_site_set(&store, "snp", "chrom", "pos").unwrap();
        assert!(keys.contains(&SiteKey::new("chr1", 100)));
    }

    #[test]
    fn inverted_interval_is_a_data_error() {
        let mut store = MemoryStore::new();
        store.create_table("rm", &interval_schema()).unwrap();
        store
            .insert_rows(
                "rm",
                vec![vec!["chr1".into(), Value::Int(20), Value::Int(10), "LINE/L1".into()]],
            )
            .unwrap();
        assert!(matches!(
            load_intervals(&store, "rm", |_| true),
            Err(FilterError::Data(_))
        ));
    }
}
