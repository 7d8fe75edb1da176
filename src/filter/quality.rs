use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{FilterError, Result};
use crate::filter::{atomically, prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::site::columns::{ALT_COUNT, FILTER, QUAL, REF_COUNT};
use crate::store::{col, Predicate, Query, TabularStore};

/// Keeps PASS sites with enough quality and read depth.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFilter {
    quality: f64,
    depth: u32,
}

impl QualityFilter {
    /// Stage tag.
    pub const NAME: &'static str = "qcfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Keep PASS sites meeting quality and read-depth thresholds.";

    /// Keep sites with `QUAL >= quality` and `ref + alt >= depth`.
    pub fn new(quality: f64, depth: u32) -> Result<Self> {
        if !quality.is_finite() {
            return Err(FilterError::invalid(Self::NAME, "quality", "must be finite"));
        }
        Ok(Self { quality, depth })
    }

    /// Build from `quality` and `depth` parameters.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(params.required("quality")?, params.required("depth")?)
    }

    fn predicate(&self) -> Predicate {
        Predicate::and([
            col(REF_COUNT).add(col(ALT_COUNT)).ge(self.depth),
            col(QUAL).ge(self.quality),
            col(FILTER).eq("PASS"),
        ])
    }
}

impl FilterStage for QualityFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("quality".to_string(), self.quality.to_string()),
            ("depth".to_string(), self.depth.to_string()),
        ])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.quality.to_string(), self.depth.to_string()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        prepare_output(store, Self::NAME, previous, current)?;
        let rows_read = store.row_count(previous)?;
        let malformed = store.count_where(
            previous,
            &Predicate::or([Predicate::is_null(REF_COUNT), Predicate::is_null(ALT_COUNT)]),
        )?;
        if malformed > 0 {
            warn!(stage = Self::NAME, table = previous, rows = malformed, "skipping rows without allele depth");
        }
        if ctx.cancel().is_cancelled() {
            return Err(FilterError::Cancelled(Self::NAME.to_string()));
        }

        let query = Query::table(previous).filter(self.predicate());
        let written = atomically(store, |store| Ok(store.bulk_insert_from_query(current, &query)?))?;

        Ok(StageOutcome {
            rows_read,
            rows_written: written,
            rows_skipped: malformed,
        })
    }
}
