use std::collections::BTreeMap;

use tracing::info;

use crate::error::Result;
use crate::filter::rows::{rewrite_rows, SiteColumns, Verdict};
use crate::filter::{prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::reference::{load_intervals, CDS_TYPE};
use crate::store::TabularStore;

/// Distance in bases within which a site counts as near a junction.
pub const DEFAULT_SPLICE_EDGE: u64 = 2;

/// Removes sites within `edge` bases of a CDS boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceJunctionFilter {
    reference: String,
    edge: u64,
}

impl SpliceJunctionFilter {
    /// Stage tag.
    pub const NAME: &'static str = "sjfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Remove sites adjacent to splice junctions of coding exons.";

    /// Filter against the gene-model table `reference`.
    pub fn new(reference: impl Into<String>, edge: u64) -> Self {
        Self {
            reference: reference.into(),
            edge,
        }
    }

    /// Build from `reference` and the optional `edge` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Ok(Self::new(
            params.table("reference")?,
            params.optional("edge", DEFAULT_SPLICE_EDGE)?,
        ))
    }
}

impl FilterStage for SpliceJunctionFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("reference".to_string(), self.reference.clone()),
            ("edge".to_string(), self.edge.to_string()),
        ])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.reference.clone(), self.edge.to_string()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let exons = load_intervals(store, &self.reference, |kind| kind == CDS_TYPE)?;
        info!(stage = Self::NAME, reference = %self.reference, exons = exons.len(), "loaded coding exons");
        let boundaries = exons.boundaries();
        let columns = SiteColumns::of_table(store, previous)?;
        prepare_output(store, Self::NAME, previous, current)?;
        rewrite_rows(store, Self::NAME, previous, current, ctx, |row| {
            match columns.key(&row) {
                Some(key) if boundaries.near(&key.chrom, key.position, self.edge) => Verdict::Drop,
                Some(_) => Verdict::Keep(row),
                None => Verdict::Skip,
            }
        })
    }
}
