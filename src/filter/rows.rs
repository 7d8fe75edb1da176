//! Column offsets for reading site tables row by row.

use tracing::warn;

use crate::error::Result;
use crate::filter::batch::BatchInserter;
use crate::filter::{StageContext, StageOutcome};
use crate::site::{columns, AlleleDepth, SiteKey};
use crate::store::{Query, Row, Schema, TabularStore, Value};

/// Resolved offsets of the site columns stages read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SiteColumns {
    chrom: usize,
    pos: usize,
    quality: usize,
    genotype: usize,
    ref_count: usize,
    alt_count: usize,
    pub(crate) alu: usize,
    pub(crate) p_value: usize,
    pub(crate) fdr: usize,
    pub(crate) level: usize,
}

impl SiteColumns {
    pub(crate) fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            chrom: schema.require_index(columns::CHROM)?,
            pos: schema.require_index(columns::POS)?,
            quality: schema.require_index(columns::QUAL)?,
            genotype: schema.require_index(columns::GT)?,
            ref_count: schema.require_index(columns::REF_COUNT)?,
            alt_count: schema.require_index(columns::ALT_COUNT)?,
            alu: schema.require_index(columns::ALU)?,
            p_value: schema.require_index(columns::P_VALUE)?,
            fdr: schema.require_index(columns::FDR)?,
            level: schema.require_index(columns::LEVEL)?,
        })
    }

    pub(crate) fn of_table(store: &dyn TabularStore, table: &str) -> Result<Self> {
        Self::resolve(&store.schema(table)?)
    }

    /// `None` when the chromosome or position is missing or not positive.
    pub(crate) fn key(&self, row: &Row) -> Option<SiteKey> {
        let chrom = row[self.chrom].as_str()?;
        let pos = row[self.pos].as_i64().filter(|p| *p >= 1)?;
        Some(SiteKey::new(chrom, pos as u64))
    }

    /// `None` when either count is missing or negative.
    pub(crate) fn depth(&self, row: &Row) -> Option<AlleleDepth> {
        let count = |v: &Value| v.as_i64().and_then(|n| u32::try_from(n).ok());
        Some(AlleleDepth::new(
            count(&row[self.ref_count])?,
            count(&row[self.alt_count])?,
        ))
    }

    pub(crate) fn quality(&self, row: &Row) -> Option<f64> {
        row[self.quality].as_f64()
    }

    pub(crate) fn genotype<'r>(&self, row: &'r Row) -> Option<&'r str> {
        row[self.genotype].as_str()
    }
}

/// What a row-wise stage does with one input row.
#[derive(Debug)]
pub(crate) enum Verdict {
    /// Write this (possibly modified) row.
    Keep(Row),
    /// Filtered out.
    Drop,
    /// Malformed; counted and logged.
    Skip,
}

/// Stream `previous` through `judge` and batch-insert kept rows into `current`.
pub(crate) fn rewrite_rows(
    store: &mut dyn TabularStore,
    stage: &'static str,
    previous: &str,
    current: &str,
    ctx: &StageContext,
    mut judge: impl FnMut(Row) -> Verdict,
) -> Result<StageOutcome> {
    let cursor = store.select(&Query::table(previous))?;
    let mut outcome = StageOutcome::default();
    let mut inserter = BatchInserter::new(store, stage, current, ctx);
    for row in cursor {
        outcome.rows_read += 1;
        match judge(row) {
            Verdict::Keep(row) => inserter.push(row)?,
            Verdict::Drop => {}
            Verdict::Skip => outcome.rows_skipped += 1,
        }
    }
    outcome.rows_written = inserter.finish()?;
    if outcome.rows_skipped > 0 {
        warn!(stage, table = previous, rows = outcome.rows_skipped, "skipped malformed rows");
    }
    Ok(outcome)
}
