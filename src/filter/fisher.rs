use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::filter::batch::BatchInserter;
use crate::filter::rows::SiteColumns;
use crate::filter::{atomically, prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::reference::load_site_set;
use crate::site::columns::{FDR, P_VALUE};
use crate::site::AlleleDepth;
use crate::stats::{benjamini_hochberg, fisher_exact_two_tailed, BackgroundRates};
use crate::store::{col, Predicate, Query, Row, TabularStore, Value};

const DEFAULT_P_VALUE: f64 = 0.01;
const DEFAULT_FDR: f64 = 0.01;

/// Fisher's exact test against a background estimated from known editing
/// sites, followed by Benjamini-Hochberg correction.
///
/// Every candidate with non-zero depth is scored and written with its
/// `P_VALUE`, `FDR` and `LEVEL`; rows over either cutoff are then deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct FisherFdrFilter {
    darned: String,
    p_value: f64,
    fdr: f64,
}

struct Candidate {
    row: Row,
    depth: AlleleDepth,
}

impl FisherFdrFilter {
    /// Stage tag.
    pub const NAME: &'static str = "fetfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Keep sites significant under Fisher's exact test with FDR control.";

    /// Test against the known-editing table `darned`.
    pub fn new(darned: impl Into<String>, p_value: f64, fdr: f64) -> Result<Self> {
        for (name, value) in [("p_value", p_value), ("fdr", fdr)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FilterError::invalid(Self::NAME, name, format!("{value} is not in [0, 1]")));
            }
        }
        Ok(Self {
            darned: darned.into(),
            p_value,
            fdr,
        })
    }

    /// Build from `darned` and the optional `p_value` / `fdr` cutoffs.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(
            params.table("darned")?,
            params.optional("p_value", DEFAULT_P_VALUE)?,
            params.optional("fdr", DEFAULT_FDR)?,
        )
    }
}

impl FilterStage for FisherFdrFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("darned".to_string(), self.darned.clone()),
            ("p_value".to_string(), self.p_value.to_string()),
            ("fdr".to_string(), self.fdr.to_string()),
        ])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![
            self.darned.clone(),
            self.p_value.to_string(),
            self.fdr.to_string(),
        ]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let known = load_site_set(store, &self.darned, "chrom", "coordinate")?;
        let columns = SiteColumns::of_table(store, previous)?;

        let mut outcome = StageOutcome::default();
        let mut candidates = Vec::new();
        let mut known_alt = Vec::new();
        let mut unknown_depth = Vec::new();
        for row in store.select(&Query::table(previous))? {
            outcome.rows_read += 1;
            let (Some(key), Some(depth)) = (columns.key(&row), columns.depth(&row)) else {
                outcome.rows_skipped += 1;
                continue;
            };
            if depth.total() == 0 {
                continue;
            }
            if known.contains(&key) {
                known_alt.push(depth.alt_count);
            } else {
                unknown_depth.push(depth.total());
            }
            candidates.push(Candidate { row, depth });
        }
        if outcome.rows_skipped > 0 {
            warn!(stage = Self::NAME, table = previous, rows = outcome.rows_skipped, "skipped rows without position or allele depth");
        }

        let background = BackgroundRates::estimate(&known_alt, &unknown_depth)?;
        info!(
            stage = Self::NAME,
            known = known_alt.len(),
            unknown = unknown_depth.len(),
            background_ref = background.ref_count,
            background_alt = background.alt_count,
            "estimated background"
        );

        let p_values: Vec<f64> = candidates
            .par_iter()
            .map(|c| {
                fisher_exact_two_tailed(
                    c.depth.ref_count,
                    c.depth.alt_count,
                    background.ref_count,
                    background.alt_count,
                )
            })
            .collect();
        let q_values = benjamini_hochberg(&p_values);

        prepare_output(store, Self::NAME, previous, current)?;
        let mut inserter = BatchInserter::new(store, Self::NAME, current, ctx);
        for ((candidate, p), q) in candidates.into_iter().zip(p_values).zip(q_values) {
            let mut row = candidate.row;
            row[columns.p_value] = Value::Float(p);
            row[columns.fdr] = Value::Float(q);
            if let Some(level) = candidate.depth.editing_level() {
                row[columns.level] = Value::Float(level);
            }
            inserter.push(row)?;
        }
        let scored = inserter.finish()?;

        let insignificant = Predicate::or([col(P_VALUE).gt(self.p_value), col(FDR).gt(self.fdr)]);
        let removed = atomically(store, |store| Ok(store.delete(current, &insignificant)?))?;
        outcome.rows_written = scored - removed;
        info!(stage = Self::NAME, table = current, scored, kept = outcome.rows_written, "applied significance cutoffs");
        Ok(outcome)
    }
}
