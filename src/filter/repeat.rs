use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::filter::rows::{rewrite_rows, SiteColumns, Verdict};
use crate::filter::{prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::reference::{load_intervals, Interval, ALU_TYPE};
use crate::store::{TabularStore, Value};

/// How to treat a site covered by both an Alu and a non-Alu repeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Keep the site and flag it as Alu.
    #[default]
    PreferAlu,
    /// Drop the site.
    PreferExclusion,
}

impl OverlapPolicy {
    fn as_str(self) -> &'static str {
        match self {
            OverlapPolicy::PreferAlu => "prefer_alu",
            OverlapPolicy::PreferExclusion => "prefer_exclusion",
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "prefer_alu" => Ok(OverlapPolicy::PreferAlu),
            "prefer_exclusion" => Ok(OverlapPolicy::PreferExclusion),
            other => Err(format!("unknown overlap policy '{other}'")),
        }
    }
}

/// What the repeat annotation says about one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coverage {
    Unannotated,
    Alu,
    Excluded,
}

/// Drops sites inside non-Alu repeats; keeps and flags sites inside Alu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatRegionFilter {
    reference: String,
    overlap: OverlapPolicy,
}

impl RepeatRegionFilter {
    /// Stage tag.
    pub const NAME: &'static str = "rrfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Remove sites in repeat regions, keeping and flagging SINE/Alu sites.";

    /// Filter against the interval table `reference`.
    pub fn new(reference: impl Into<String>, overlap: OverlapPolicy) -> Self {
        Self {
            reference: reference.into(),
            overlap,
        }
    }

    /// Build from `reference` and the optional `overlap` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        Ok(Self::new(
            params.table("reference")?,
            params.optional("overlap", OverlapPolicy::default())?,
        ))
    }

    fn classify(&self, hits: &[&Interval]) -> Coverage {
        if hits.is_empty() {
            return Coverage::Unannotated;
        }
        let alu = hits.iter().any(|iv| iv.kind == ALU_TYPE);
        let other = hits.iter().any(|iv| iv.kind != ALU_TYPE);
        match (alu, other, self.overlap) {
            (true, false, _) | (true, true, OverlapPolicy::PreferAlu) => Coverage::Alu,
            _ => Coverage::Excluded,
        }
    }
}

impl FilterStage for RepeatRegionFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("reference".to_string(), self.reference.clone()),
            ("overlap".to_string(), self.overlap.to_string()),
        ])
    }

    fn name_tokens(&self) -> Vec<String> {
        vec![self.reference.clone(), self.overlap.to_string()]
    }

    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome> {
        let repeats = load_intervals(store, &self.reference, |_| true)?;
        info!(stage = Self::NAME, reference = %self.reference, intervals = repeats.len(), "loaded repeat intervals");
        let columns = SiteColumns::of_table(store, previous)?;
        prepare_output(store, Self::NAME, previous, current)?;

        let mut flagged = 0usize;
        let outcome = rewrite_rows(store, Self::NAME, previous, current, ctx, |mut row| {
            let Some(key) = columns.key(&row) else {
                return Verdict::Skip;
            };
            match self.classify(&repeats.covering(&key.chrom, key.position)) {
                Coverage::Unannotated => Verdict::Keep(row),
                Coverage::Alu => {
                    flagged += 1;
                    row[columns.alu] = Value::from("T");
                    Verdict::Keep(row)
                }
                Coverage::Excluded => Verdict::Drop,
            }
        })?;
        info!(stage = Self::NAME, table = current, alu = flagged, "flagged Alu sites");
        Ok(outcome)
    }
}
