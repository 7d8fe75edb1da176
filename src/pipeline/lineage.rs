//! Persisted record of which stage produced which table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::store::{col, ColumnSpec, ColumnType, Predicate, Query, Row, Schema, TabularStore, Value};

/// Name of the lineage table.
pub const LINEAGE_TABLE: &str = "lineage";

/// Final state of a stage application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Output table is complete.
    Succeeded,
    /// The stage returned an error.
    Failed,
    /// The cancellation token fired.
    Cancelled,
}

impl StageStatus {
    /// Stored spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Cancelled => "cancelled",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "succeeded" => Some(StageStatus::Succeeded),
            "failed" => Some(StageStatus::Failed),
            "cancelled" => Some(StageStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    /// Stage tag.
    pub stage: String,
    /// Canonical parameters the stage ran with.
    pub parameters: BTreeMap<String, String>,
    /// Input table.
    pub parent_table: String,
    /// Output table.
    pub output_table: String,
    /// How the stage ended.
    pub status: StageStatus,
    /// Unix milliseconds at stage start.
    pub started_ms: i64,
    /// Unix milliseconds at stage end.
    pub finished_ms: i64,
    /// Rows in the output table once the stage finished.
    pub output_rows: usize,
}

/// Layout of [`LINEAGE_TABLE`].
pub fn lineage_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::new("stage", ColumnType::Text),
        ColumnSpec::new("parameters", ColumnType::Text),
        ColumnSpec::new("parent_table", ColumnType::Text),
        ColumnSpec::new("output_table", ColumnType::Text),
        ColumnSpec::new("status", ColumnType::Text),
        ColumnSpec::new("started_ms", ColumnType::Int),
        ColumnSpec::new("finished_ms", ColumnType::Int),
        ColumnSpec::new("output_rows", ColumnType::Int),
    ])
}

impl LineageRecord {
    fn to_row(&self) -> Result<Row> {
        let parameters = serde_json::to_string(&self.parameters)
            .map_err(|e| FilterError::Data(format!("cannot encode stage parameters: {e}")))?;
        Ok(vec![
            Value::from(self.stage.as_str()),
            Value::Text(parameters),
            Value::from(self.parent_table.as_str()),
            Value::from(self.output_table.as_str()),
            Value::from(self.status.as_str()),
            Value::Int(self.started_ms),
            Value::Int(self.finished_ms),
            Value::Int(self.output_rows as i64),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let text = |i: usize| {
            row[i]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| FilterError::Data(format!("lineage cell {i} is not text")))
        };
        let parameters = serde_json::from_str(&text(1)?)
            .map_err(|e| FilterError::Data(format!("bad lineage parameters: {e}")))?;
        let status = text(4)?;
        Ok(Self {
            stage: text(0)?,
            parameters,
            parent_table: text(2)?,
            output_table: text(3)?,
            status: StageStatus::parse(&status)
                .ok_or_else(|| FilterError::Data(format!("unknown lineage status '{status}'")))?,
            started_ms: row[5].as_i64().unwrap_or_default(),
            finished_ms: row[6].as_i64().unwrap_or_default(),
            output_rows: row[7].as_i64().unwrap_or_default().max(0) as usize,
        })
    }
}

/// Append `record`, replacing any earlier record for the same output table.
pub fn record_lineage(store: &mut dyn TabularStore, record: &LineageRecord) -> Result<()> {
    if !store.table_exists(LINEAGE_TABLE) {
        store.create_table(LINEAGE_TABLE, &lineage_schema())?;
    }
    store.delete(
        LINEAGE_TABLE,
        &col("output_table").eq(record.output_table.as_str()),
    )?;
    store.insert_rows(LINEAGE_TABLE, vec![record.to_row()?])?;
    Ok(())
}

/// Every lineage record, in insertion order.
pub fn load_lineage(store: &dyn TabularStore) -> Result<Vec<LineageRecord>> {
    if !store.table_exists(LINEAGE_TABLE) {
        return Ok(Vec::new());
    }
    store
        .select(&Query::table(LINEAGE_TABLE))?
        .map(|row| LineageRecord::from_row(&row))
        .collect()
}

/// Delete lineage records whose output table satisfies `doomed`.
pub fn forget_lineage(store: &mut dyn TabularStore, doomed: impl Fn(&str) -> bool) -> Result<usize> {
    let doomed: Vec<Predicate> = load_lineage(store)?
        .iter()
        .filter(|r| doomed(&r.output_table))
        .map(|r| col("output_table").eq(r.output_table.as_str()))
        .collect();
    if doomed.is_empty() {
        return Ok(0);
    }
    Ok(store.delete(LINEAGE_TABLE, &Predicate::or(doomed))?)
}

/// Filter tree rebuilt from parent links.
#[derive(Debug, Default)]
pub struct LineageTree {
    children: BTreeMap<String, Vec<LineageRecord>>,
    roots: BTreeSet<String>,
}

impl LineageTree {
    /// Build the tree from records in any order.
    pub fn from_records(records: Vec<LineageRecord>) -> Self {
        let outputs: BTreeSet<String> = records.iter().map(|r| r.output_table.clone()).collect();
        let mut tree = LineageTree::default();
        for record in records {
            if !outputs.contains(&record.parent_table) {
                tree.roots.insert(record.parent_table.clone());
            }
            tree.children
                .entry(record.parent_table.clone())
                .or_default()
                .push(record);
        }
        for siblings in tree.children.values_mut() {
            siblings.sort_by_key(|r| (r.started_ms, r.output_table.clone()));
        }
        tree
    }

    /// Tables no recorded stage produced.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    /// Stages applied directly to `table`.
    pub fn children(&self, table: &str) -> &[LineageRecord] {
        self.children.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Indented text rendering, one line per table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            let _ = writeln!(out, "{root}");
            self.render_children(root, 1, &mut out);
        }
        out
    }

    fn render_children(&self, table: &str, depth: usize, out: &mut String) {
        for record in self.children(table) {
            let params = record
                .parameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "{:indent$}{} [{}] -> {} ({} rows, {})",
                "",
                record.stage,
                params,
                record.output_table,
                record.output_rows,
                record.status,
                indent = depth * 2
            );
            self.render_children(&record.output_table, depth + 1, out);
        }
    }
}
