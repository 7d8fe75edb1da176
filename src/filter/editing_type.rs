use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::{FilterError, Result};
use crate::filter::{atomically, prepare_output, FilterStage, StageContext, StageOutcome, StageParams};
use crate::site::columns::{ALT, REF, STRAND};
use crate::site::Strand;
use crate::store::{col, Predicate, Query, TabularStore, Value};

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// Watson-Crick complement of a nucleotide; other characters map to themselves.
pub fn complement(base: char) -> char {
    match base.to_ascii_uppercase() {
        'A' => 'T',
        'T' => 'A',
        'C' => 'G',
        'G' => 'C',
        other => other,
    }
}

/// Requested reference-to-alternate substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditingType {
    /// One substitution, matched on both strands.
    Pair {
        /// Reference base.
        reference: char,
        /// Alternate base.
        alternate: char,
    },
    /// Every substitution.
    All,
}

impl EditingType {
    /// The substitution as it appears on the opposite strand.
    pub fn reverse_complement(self) -> Self {
        match self {
            EditingType::Pair {
                reference,
                alternate,
            } => EditingType::Pair {
                reference: complement(reference),
                alternate: complement(alternate),
            },
            EditingType::All => EditingType::All,
        }
    }

    fn predicate(self) -> Predicate {
        match self {
            EditingType::Pair {
                reference,
                alternate,
            } => Predicate::and([col(REF).eq(reference), col(ALT).eq(alternate)]),
            EditingType::All => Predicate::True,
        }
    }
}

impl FromStr for EditingType {
    type Err = String;

    /// Accepts `AG`, `A_G`, `A>G`, `A-G` (any case) or `all`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(EditingType::All);
        }
        let bases: Vec<char> = trimmed
            .chars()
            .filter(|c| !matches!(*c, '_' | '>' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let &[reference, alternate] = bases.as_slice() else {
            return Err(format!("expected two bases, got '{trimmed}'"));
        };
        if let Some(bad) = [reference, alternate].into_iter().find(|b| !BASES.contains(b)) {
            return Err(format!("'{bad}' is not a nucleotide"));
        }
        if reference == alternate {
            return Err(format!("reference and alternate are both '{reference}'"));
        }
        Ok(EditingType::Pair {
            reference,
            alternate,
        })
    }
}

impl fmt::Display for EditingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditingType::Pair {
                reference,
                alternate,
            } => write!(f, "{reference}{alternate}"),
            EditingType::All => f.write_str("all"),
        }
    }
}

/// Keeps sites of one editing type, on either strand.
///
/// Sites matching the reverse complement are kept with `STRAND = '-'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditingTypeFilter {
    editing: EditingType,
}

impl EditingTypeFilter {
    /// Stage tag.
    pub const NAME: &'static str = "etfilter";

    /// One-line summary shown by stage listings.
    pub const DESCRIPTION: &'static str = "Keep sites of one editing type, accepting the reverse-complement strand.";

    /// Filter for `editing`.
    pub fn new(editing: EditingType) -> Self {
        Self { editing }
    }

    /// Build from the `ref_alt` parameter.
    pub fn from_params(params: &StageParams) -> Result<Self> {
        let raw: String = params.required("ref_alt")?;
        raw.parse()
            .map(Self::new)
            .map_err(|reason: String| FilterError::invalid(Self::NAME, "ref_alt", reason))
    }
}

impl FilterStage for EditingTypeFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("ref_alt".to_string(), self.editing.to_string())])
    }

    fn name_tokens(&self) -> Vec<String> {
        match self.editing {
            EditingType::Pair {
                reference,
                alternate,
            } => vec![reference.to_string(), alternate.to_string()],
            EditingType::All => vec!["all".to_string()],
        }
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
        if ctx.cancel().is_cancelled() {
            return Err(FilterError::Cancelled(Self::NAME.to_string()));
        }

        let forward = self.editing.predicate();
        let reverse = self.editing.reverse_complement();
        let written = atomically(store, |store| {
            let mut written =
                store.bulk_insert_from_query(current, &Query::table(previous).filter(forward))?;
            if reverse != self.editing {
                let reverse = reverse.predicate();
                let flipped = store
                    .bulk_insert_from_query(current, &Query::table(previous).filter(reverse.clone()))?;
                store.update(current, &[(STRAND, Value::from(Strand::Reverse.symbol()))], &reverse)?;
                info!(stage = Self::NAME, table = current, rows = flipped, "kept reverse-strand sites");
                written += flipped;
            }
            Ok(written)
        })?;

        Ok(StageOutcome {
            rows_read,
            rows_written: written,
            rows_skipped: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{records, site_table};
    use crate::site::fixtures::site;
    use crate::site::SiteRecord;
    use crate::store::MemoryStore;
    use test_case::test_case;

    #[test_case("AG" ; "bare")]
    #[test_case("A_G" ; "underscore")]
    #[test_case("a>g" ; "arrow lowercase")]
    #[test_case(" A-G " ; "dash padded")]
    fn parses_pair_spellings(raw: &str) {
        assert_eq!(
            raw.parse::<EditingType>().unwrap(),
            EditingType::Pair {
                reference: 'A',
                alternate: 'G'
            }
        );
    }

    #[test_case("AA" ; "same base")]
    #[test_case("AN" ; "not a nucleotide")]
    #[test_case("AGT" ; "three bases")]
    #[test_case("" ; "empty")]
    fn rejects_bad_pairs(raw: &str) {
        assert!(raw.parse::<EditingType>().is_err());
    }

    #[test]
    fn same_base_is_a_parameter_error() {
        let params = StageParams::from_pairs(EditingTypeFilter::NAME, &[("ref_alt", "GG")]);
        assert!(matches!(
            EditingTypeFilter::from_params(&params),
            Err(FilterError::InvalidParameter { .. })
        ));
    }

    fn all_substitutions() -> Vec<SiteRecord> {
        let mut sites = Vec::new();
        for (i, (r, a)) in BASES
            .iter()
            .flat_map(|&r| BASES.iter().map(move |&a| (r, a)))
            .filter(|(r, a)| r != a)
            .enumerate()
        {
            let mut record = site("chr1", i as u64 + 1, 5, 5, 30.0);
            record.reference_base = r;
            record.alternate_base = a;
            sites.push(record);
        }
        sites
    }

    #[test]
    fn every_pair_keeps_exactly_its_two_strands() {
        let sites = all_substitutions();
        assert_eq!(sites.len(), 12);
        for &r in &BASES {
            for &a in BASES.iter().filter(|&&a| a != r) {
                let mut store = MemoryStore::new();
                site_table(&mut store, "in", &sites);
                let editing = EditingType::Pair {
                    reference: r,
                    alternate: a,
                };
                EditingTypeFilter::new(editing)
                    .apply(&mut store, "in", "out", &StageContext::default())
                    .unwrap();

                let mut kept: Vec<(char, char, Strand)> = records(&store, "out")
                    .iter()
                    .map(|s| (s.reference_base, s.alternate_base, s.strand))
                    .collect();
                kept.sort_by_key(|(r, a, _)| (*r, *a));
                let mut expected = vec![(r, a, Strand::Forward), (complement(r), complement(a), Strand::Reverse)];
                expected.sort_by_key(|(r, a, _)| (*r, *a));
                assert_eq!(kept, expected, "editing type {editing}");
            }
        }
    }

    #[test]
    fn all_keeps_everything_forward() {
        let mut store = MemoryStore::new();
        site_table(&mut store, "in", &all_substitutions());
        let outcome = EditingTypeFilter::new(EditingType::All)
            .apply(&mut store, "in", "out", &StageContext::default())
            .unwrap();
        assert_eq!(outcome.rows_written, 12);
        assert!(records(&store, "out").iter().all(|s| s.strand == Strand::Forward));
    }

    #[test]
    fn complement_pairs() {
        assert_eq!(complement('a'), 'T');
        assert_eq!(complement('G'), 'C');
        assert_eq!(complement('N'), 'N');
    }
}
