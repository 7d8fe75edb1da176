//! Filter stages: table-to-table narrowing transformations.
//!
//! Each stage reads a previous site table and writes a new one. Stages are
//! built from a string parameter map (validated before the store is
//! touched) and receive the store explicitly when applied.

mod batch;
mod context;
mod dedup;
mod dna_rna;
mod editing_type;
mod fisher;
mod known_snp;
mod llr;
mod params;
mod quality;
mod registry;
mod repeat;
mod rows;
mod splice;

pub(crate) use batch::BatchInserter;
pub use context::{CancellationToken, StageContext, DEFAULT_BATCH_SIZE};
pub use dedup::distinct;
pub use dna_rna::DnaRnaFilter;
pub use editing_type::{complement, EditingType, EditingTypeFilter};
pub use fisher::FisherFdrFilter;
pub use known_snp::KnownSnpFilter;
pub use llr::LlrFilter;
pub use params::StageParams;
pub use quality::QualityFilter;
pub use registry::{perform_filter, StageInfo, StageRegistry};
pub use repeat::{OverlapPolicy, RepeatRegionFilter};
pub use splice::SpliceJunctionFilter;

use std::collections::BTreeMap;
use std::fmt::Debug;

use tracing::debug;

use crate::error::{FilterError, Result};
use crate::store::TabularStore;

/// Row accounting for one stage application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Rows read from the previous table.
    pub rows_read: usize,
    /// Rows written to the output table.
    pub rows_written: usize,
    /// Rows skipped because of malformed data.
    pub rows_skipped: usize,
}

/// One unit of the pipeline.
pub trait FilterStage: Send + Sync + Debug {
    /// Stage tag, used in output table names and lineage records.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Canonical parameter map recorded in the lineage.
    fn parameters(&self) -> BTreeMap<String, String>;

    /// Parameter tokens appended to the output table name after the tag.
    fn name_tokens(&self) -> Vec<String> {
        Vec::new()
    }

    /// Read `previous`, write the surviving rows to `current`.
    ///
    /// `current` is dropped and recreated first, so a rerun after a failure
    /// starts from an empty table.
    fn apply(
        &self,
        store: &mut dyn TabularStore,
        previous: &str,
        current: &str,
        ctx: &StageContext,
    ) -> Result<StageOutcome>;
}

/// Drop and recreate `current` with the schema of `previous`.
pub(crate) fn prepare_output(
    store: &mut dyn TabularStore,
    stage: &str,
    previous: &str,
    current: &str,
) -> Result<()> {
    if previous == current {
        return Err(FilterError::invalid(
            stage,
            "current_table",
            "output table must differ from the input table",
        ));
    }
    let schema = store.schema(previous)?;
    if store.drop_table_if_exists(current)? {
        debug!(stage, table = current, "dropped stale output table");
    }
    store.create_table(current, &schema)?;
    Ok(())
}

/// Run `work` inside one transaction, rolling back if it fails.
pub(crate) fn atomically<T>(
    store: &mut dyn TabularStore,
    work: impl FnOnce(&mut dyn TabularStore) -> Result<T>,
) -> Result<T> {
    store.begin_transaction()?;
    match work(&mut *store) {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(err) => {
            store.rollback()?;
            Err(err)
        }
    }
}
