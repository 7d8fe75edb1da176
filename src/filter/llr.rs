use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::filter::batch::BatchInserter;
use crate::filter::rows::SiteColumns;
use crate::filter::{prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::site::{AlleleDepth, SiteKey};
use crate::stats::{llr_judge, DEFAULT_LLR_THRESHOLD};
use crate::store::{Query, Row, TabularStore};

/// Keeps sites whose DNA evidence supports a homozygous-reference genotype.
///
/// Allele counts come from the matched DNA row, quality from the RNA row.
/// Sites without a DNA match, or with zero DNA depth, are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct LlrFilter {
    dna_table: String,
    threshold: f64,
}

impl LlrFilter {
    /// Stage tag.
    pub const NAME: &'static str = "llrfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Keep sites whose DNA log-likelihood ratio passes the threshold.";

    /// Judge against `dna_table` with the given threshold.
    pub fn new(dna_table: impl Into<String>, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() {
            return Err(FilterError::invalid(Self::NAME, "threshold", "must be finite"));
        }
        Ok(Self {
            dna_table: dna_table.into(),
            threshold,
        })
    }

    /// Build from `dna_table` and the optional `threshold` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(
            params.table("dna_table")?,
            params.optional("threshold", DEFAULT_LLR_THRESHOLD)?,
        )
    }

    fn dna_depths(&self, store: &dyn TabularStore) -> Result<HashMap<SiteKey, AlleleDepth>> {
        let columns = SiteColumns::of_table(store, &self.dna_table)?;
        let mut depths = HashMap::new();
        for row in store.select(&Query::table(&self.dna_table))? {
            if let (Some(key), Some(depth)) = (columns.key(&row), columns.depth(&row)) {
                // First DNA row wins on duplicate keys.
                depths.entry(key).or_insert(depth);
            }
        }
        Ok(depths)
    }

    /// `Some(true)` to keep, `Some(false)` to drop, `None` for a malformed row.
    fn judge(
        &self,
        columns: &SiteColumns,
        dna: &HashMap<SiteKey, AlleleDepth>,
        row: &Row,
    ) -> Option<bool> {
        let key = columns.key(row)?;
        let quality = columns.quality(row)?;
        Some(
            dna.get(&key)
                .and_then(|d| llr_judge(d.ref_count, d.alt_count, quality))
                .is_some_and(|score| score >= self.threshold),
        )
    }
}

impl FilterStage for LlrFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("dna_table".to_string(), self.dna_table.clone()),
            ("threshold".to_string(), self.threshold.to_string()),
        ])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.dna_table.clone(), self.threshold.to_string()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let dna = self.dna_depths(store)?;
        info!(stage = Self::NAME, table = %self.dna_table, sites = dna.len(), "loaded DNA allele depths");
        let columns = SiteColumns::of_table(store, previous)?;
        prepare_output(store, Self::NAME, previous, current)?;

        let rows: Vec<Row> = store.select(&Query::table(previous))?.collect();
        let mut outcome = StageOutcome {
            rows_read: rows.len(),
            ..StageOutcome::default()
        };
        let mut inserter = BatchInserter::new(store, Self::NAME, current, ctx);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Row> = rows.by_ref().take(ctx.batch_size()).collect();
            let verdicts: Vec<Option<bool>> = chunk
                .par_iter()
                .map(|row| self.judge(&columns, &dna, row))
                .collect();
            outcome.rows_skipped += verdicts.iter().filter(|v| v.is_none()).count();
            let kept = chunk
                .into_iter()
                .zip(verdicts)
                .filter_map(|(row, verdict)| (verdict == Some(true)).then_some(row));
            inserter.extend(kept)?;
        }
        outcome.rows_written = inserter.finish()?;
        if outcome.rows_skipped > 0 {
            warn!(stage = Self::NAME, table = previous, rows = outcome.rows_skipped, "skipped rows without position or quality");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{keys, site_table};
    use crate::site::fixtures::site;
    use crate::store::MemoryStore;

    fn run(rna_quality: f64, dna: &[(u64, u32, u32)], threshold: f64) -> Vec<u64> {
        let mut store = MemoryStore::new();
        let rna: Vec<_> = dna.iter().map(|&(p, _, _)| site("chr1", p, 3, 3, rna_quality)).collect();
        site_table(&mut store, "rna", &rna);
        let dna: Vec<_> = dna.iter().map(|&(p, r, a)| site("chr1", p, r, a, 0.0)).collect();
        site_table(&mut store, "dna", &dna);
        LlrFilter::new("dna", threshold)
            .unwrap()
            .apply(&mut store, "rna", "out", &StageContext::with_batch_size(2))
            .unwrap();
        keys(&store, "out").into_iter().map(|(_, p)| p).collect()
    }

    #[test]
    fn pure_reference_dna_passes_on_quality() {
        // judge = 0 + 30 / 10 = 3
        assert_eq!(run(30.0, &[(1, 100, 0)], 3.0), vec![1]);
        assert!(run(30.0, &[(1, 100, 0)], 4.0).is_empty());
    }

    #[test]
    fn balanced_dna_fails() {
        // 100 * log10(0.5) + 40 / 10 = -26.10
        assert!(run(40.0, &[(1, 50, 50)], DEFAULT_LLR_THRESHOLD).is_empty());
    }

    #[test]
    fn zero_depth_and_unmatched_sites_are_dropped() {
        let mut store = MemoryStore::new();
        site_table(
            &mut store,
            "rna",
            &[site("chr1", 1, 3, 3, 60.0), site("chr1", 2, 3, 3, 60.0), site("chr1", 3, 3, 3, 60.0)],
        );
        site_table(&mut store, "dna", &[site("chr1", 1, 20, 0, 0.0), site("chr1", 2, 0, 0, 0.0)]);
        let outcome = LlrFilter::new("dna", 4.0)
            .unwrap()
            .apply(&mut store, "rna", "out", &StageContext::default())
            .unwrap();
        assert_eq!(outcome.rows_read, 3);
        assert_eq!(keys(&store, "out"), vec![("chr1".into(), 1)]);
    }

    #[test]
    fn chunked_scoring_preserves_order() {
        let dna: Vec<_> = (1..=9).map(|p| (p, 30, if p % 3 == 0 { 30 } else { 0 })).collect();
        assert_eq!(run(50.0, &dna, 4.0), vec![1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn zero_batch_size_still_scores_every_row() {
        let mut store = MemoryStore::new();
        site_table(&mut store, "rna", &[site("chr1", 1, 3, 3, 60.0), site("chr1", 2, 3, 3, 60.0)]);
        site_table(&mut store, "dna", &[site("chr1", 1, 20, 0, 0.0), site("chr1", 2, 20, 0, 0.0)]);
        let outcome = LlrFilter::new("dna", 4.0)
            .unwrap()
            .apply(&mut store, "rna", "out", &StageContext::with_batch_size(0))
            .unwrap();
        assert_eq!(outcome.rows_written, 2);
    }

    #[test]
    fn table_name_carries_dna_table_and_threshold() {
        let a = LlrFilter::new("dna_a", 4.0).unwrap().name_tokens();
        let b = LlrFilter::new("dna_b", 4.0).unwrap().name_tokens();
        assert_eq!(a, vec!["dna_a".to_string(), "4".to_string()]);
        assert_ne!(a, b);
    }
}
