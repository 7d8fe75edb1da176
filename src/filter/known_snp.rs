use std::collections::BTreeMap;

use tracing::info;

use crate::error::Result;
use crate::filter::rows::{rewrite_rows, SiteColumns, Verdict};
use crate::filter::{prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::reference::load_site_set;
use crate::store::TabularStore;

/// Removes sites listed in a known-SNP reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownSnpFilter {
    reference: String,
}

impl KnownSnpFilter {
    /// Stage tag.
    pub const NAME: &'static str = "dbsnpfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Remove sites present in a known-SNP database.";

    /// Filter against the `chrom, pos` table `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    /// Build from the `reference` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Ok(Self::new(params.table("reference")?))
    }
}

impl FilterStage for KnownSnpFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("reference".to_string(), self.reference.clone())])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.reference.clone()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let known = load_site_set(store, &self.reference, "chrom", "pos")?;
        info!(stage = Self::NAME, reference = %self.reference, sites = known.len(), "loaded known SNPs");
        let columns = SiteColumns::of_table(store, previous)?;
        prepare_output(store, Self::NAME, previous, current)?;
        rewrite_rows(store, Self::NAME, previous, current, ctx, |row| {
            match columns.key(&row) {
                Some(key) if known.contains(&key) => Verdict::Drop,
                Some(_) => Verdict::Keep(row),
                None => Verdict::Skip,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{keys, site_table};
    use crate::reference::known_snp_schema;
    use crate::site::fixtures::site;
    use crate::store::{MemoryStore, Value};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        site_table(
            &mut store,
            "in",
            &[site("chr1", 100, 5, 5, 30.0), site("chr1", 200, 5, 5, 30.0), site("chrX", 100, 5, 5, 30.0)],
        );
        store.create_table("dbsnp", &known_snp_schema()).unwrap();
        store
            .insert_rows(
                "dbsnp",
                vec![
                    vec!["1".into(), Value::Int(100)],
                    vec!["chr2".into(), Value::Int(200)],
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn drops_known_sites_across_chrom_styles() {
        let mut store = store();
        let outcome = KnownSnpFilter::new("dbsnp")
            .apply(&mut store, "in", "out", &StageContext::default())
            .unwrap();
        assert_eq!(outcome.rows_written, 2);
        assert_eq!(keys(&store, "out"), vec![("chr1".into(), 200), ("chrX".into(), 100)]);
    }

    #[test]
    fn missing_reference_fails_before_output() {
        let mut store = store();
        let result = KnownSnpFilter::new("nope").apply(&mut store, "in", "out", &StageContext::default());
        assert!(result.is_err());
        assert!(!store.table_exists("out"));
    }
}
