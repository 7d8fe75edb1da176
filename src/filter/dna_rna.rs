use std::collections::{BTreeMap, HashSet};

use tracing::info;

use crate::error::Result;
use crate::filter::rows::{rewrite_rows, SiteColumns, Verdict};
use crate::filter::{prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::site::SiteKey;
use crate::store::{Query, TabularStore};

const HOMOZYGOUS_REFERENCE: &str = "0/0";

/// Keeps RNA sites where matched DNA shows no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaRnaFilter {
    dna_table: String,
}

impl DnaRnaFilter {
    /// Stage tag.
    pub const NAME: &'static str = "drfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Keep RNA sites whose matched DNA is homozygous for the reference allele.";

    /// Compare against the site table `dna_table`.
    pub fn new(dna_table: impl Into<String>) -> Self {
        Self {
            dna_table: dna_table.into(),
        }
    }

    /// Build from the `dna_table` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Ok(Self::new(params.table("dna_table")?))
    }

    fn reference_sites(&self, store: &dyn TabularStore) -> Result<HashSet<SiteKey>> {
        let columns = SiteColumns::of_table(store, &self.dna_table)?;
        let sites = store
            .select(&Query::table(&self.dna_table))?
            .filter(|row| {
                columns.genotype(row) == Some(HOMOZYGOUS_REFERENCE)
                    || columns.depth(row).is_some_and(|d| d.alt_count == 0)
            })
            .filter_map(|row| columns.key(&row))
            .collect();
        Ok(sites)
    }
}

impl FilterStage for DnaRnaFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("dna_table".to_string(), self.dna_table.clone())])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.dna_table.clone()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let dna = self.reference_sites(store)?;
        info!(stage = Self::NAME, table = %self.dna_table, sites = dna.len(), "loaded reference-only DNA sites");
        let columns = SiteColumns::of_table(store, previous)?;
        prepare_output(store, Self::NAME, previous, current)?;
        rewrite_rows(store, Self::NAME, previous, current, ctx, |row| {
            match columns.key(&row) {
                Some(key) if dna.contains(&key) => Verdict::Keep(row),
                Some(_) => Verdict::Drop,
                None => Verdict::Skip,
            }
        })
    }
}
