//! Sequential stage execution with naming, lineage and subset checks.

mod fingerprint;
mod lineage;
mod naming;

pub use fingerprint::fingerprint;
pub use lineage::{
    forget_lineage, lineage_schema, load_lineage, record_lineage, LineageRecord, LineageTree,
    StageStatus, LINEAGE_TABLE,
};
pub use naming::{sanitize_token, TableName};

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{error, info, info_span};

use crate::config::PipelineConfig;
use crate::error::{FilterError, Result};
use crate::filter::{distinct, FilterStage, StageContext, StageRegistry};
use crate::store::TabularStore;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// Stage tag.
    pub stage: String,
    /// Canonical parameters.
    pub parameters: BTreeMap<String, String>,
    /// Table the stage read.
    pub input_table: String,
    /// Table the stage wrote.
    pub output_table: String,
    /// Rows in the input table.
    pub input_rows: usize,
    /// Rows in the output table after any dedup.
    pub output_rows: usize,
    /// Malformed rows the stage skipped.
    pub skipped_rows: usize,
    /// Duplicate rows removed by the dedup post-step.
    pub deduplicated_rows: usize,
    /// Unix milliseconds at start.
    pub started_ms: i64,
    /// Unix milliseconds at end.
    pub finished_ms: i64,
    /// How the stage ended.
    pub status: StageStatus,
}

impl StageReport {
    fn lineage(&self) -> LineageRecord {
        LineageRecord {
            stage: self.stage.clone(),
            parameters: self.parameters.clone(),
            parent_table: self.input_table.clone(),
            output_table: self.output_table.clone(),
            status: self.status,
            started_ms: self.started_ms,
            finished_ms: self.finished_ms,
            output_rows: self.output_rows,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// One report per stage, in order.
    pub reports: Vec<StageReport>,
    /// Output table of the last stage (the input table if there were none).
    pub final_table: String,
}

#[derive(Debug)]
struct Step {
    stage: Box<dyn FilterStage>,
    dedup: bool,
}

/// An ordered chain of stages over one sample.
#[derive(Debug)]
pub struct Pipeline {
    base: TableName,
    steps: Vec<Step>,
    ctx: StageContext,
}

impl Pipeline {
    /// Empty pipeline reading `{sample}_{source}`.
    pub fn new(sample: &str, source: &str) -> Self {
        Self {
            base: TableName::base(sample, source),
            steps: Vec::new(),
            ctx: StageContext::default(),
        }
    }

    /// Build every configured stage, failing before anything runs if any
    /// stage name or parameter is invalid.
    pub fn from_config(config: &PipelineConfig, registry: &StageRegistry) -> Result<Self> {
        let mut pipeline = Self::new(&config.sample, &config.source)
            .with_context(StageContext::with_batch_size(config.batch_size));
        for step in &config.stages {
            pipeline = pipeline.then(registry.build(&step.stage, &step.params)?, step.dedup);
        }
        Ok(pipeline)
    }

    /// Replace the execution context.
    pub fn with_context(mut self, ctx: StageContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Append a stage; `dedup` collapses duplicate output rows afterwards.
    pub fn then(mut self, stage: Box<dyn FilterStage>, dedup: bool) -> Self {
        self.steps.push(Step { stage, dedup });
        self
    }

    /// The table the first stage reads.
    pub fn input_table(&self) -> &str {
        self.base.as_str()
    }

    /// Output table names, in stage order.
    pub fn table_names(&self) -> Vec<TableName> {
        let mut name = self.base.clone();
        self.steps
            .iter()
            .map(|step| {
                name = name.with_stage(step.stage.name(), &step.stage.name_tokens());
                name.clone()
            })
            .collect()
    }

    /// Run every stage in order.
    ///
    /// Halts at the first failure: the failure is recorded in the lineage
    /// and returned as [`FilterError::StageFailed`].
    pub fn run(&self, store: &mut dyn TabularStore) -> Result<PipelineRun> {
        let mut previous = self.base.as_str().to_string();
        store.schema(&previous)?;
        let mut reports = Vec::with_capacity(self.steps.len());

        for (step, current) in self.steps.iter().zip(self.table_names()) {
            let report = self.run_step(store, step, &previous, current.as_str())?;
            previous = report.output_table.clone();
            reports.push(report);
        }
        Ok(PipelineRun {
            reports,
            final_table: previous,
        })
    }

    fn run_step(
        &self,
        store: &mut dyn TabularStore,
        step: &Step,
        previous: &str,
        current: &str,
    ) -> Result<StageReport> {
        let stage = step.stage.name();
        let span = info_span!("stage", stage, input = previous, output = current);
        let _guard = span.enter();
        let clock = Instant::now();
        let mut report = StageReport {
            stage: stage.to_string(),
            parameters: step.stage.parameters(),
            input_table: previous.to_string(),
            output_table: current.to_string(),
            input_rows: store.row_count(previous)?,
            output_rows: 0,
            skipped_rows: 0,
            deduplicated_rows: 0,
            started_ms: now_ms(),
            finished_ms: 0,
            status: StageStatus::Succeeded,
        };
        info!(rows = report.input_rows, "stage started");

        let result = step
            .stage
            .apply(store, previous, current, &self.ctx)
            .and_then(|outcome| {
                report.skipped_rows = outcome.rows_skipped;
                if step.dedup {
                    report.deduplicated_rows = distinct(store, current)?;
                }
                report.output_rows = store.row_count(current)?;
                if report.output_rows > report.input_rows {
                    return Err(FilterError::SubsetViolation {
                        stage: stage.to_string(),
                        input: report.input_rows,
                        output: report.output_rows,
                    });
                }
                Ok(())
            });
        report.finished_ms = now_ms();

        if let Err(err) = result {
            report.status = match err {
                FilterError::Cancelled(_) => StageStatus::Cancelled,
                _ => StageStatus::Failed,
            };
            error!(%err, status = %report.status, "stage halted the pipeline");
            if store.in_transaction() {
                store.rollback()?;
            }
            record_lineage(store, &report.lineage())?;
            return Err(FilterError::StageFailed {
                stage: stage.to_string(),
                table: current.to_string(),
                source: Box::new(err),
            });
        }

        record_lineage(store, &report.lineage())?;
        info!(
            rows = report.output_rows,
            removed = report.input_rows - report.output_rows,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "stage finished"
        );
        Ok(report)
    }
}

/// Sources a sample is imported from unless told otherwise.
pub const DEFAULT_SOURCES: &[&str] = &["rnavcf", "dnavcf"];

/// Drop every table belonging to `sample` along with its lineage.
///
/// The sample owns its `{sample}_{source}` base tables and every table the
/// lineage derives from them. Names are never matched by prefix, so sample
/// `s` leaves `s_b_rnavcf` alone. Returns the dropped tables, sorted.
pub fn drop_sample(
    store: &mut dyn TabularStore,
    sample: &str,
    sources: &[&str],
) -> Result<Vec<String>> {
    let tree = LineageTree::from_records(load_lineage(store)?);
    let mut owned = BTreeSet::new();
    let mut pending: Vec<String> = sources
        .iter()
        .map(|source| TableName::base(sample, source).as_str().to_string())
        .collect();
    while let Some(table) = pending.pop() {
        if owned.insert(table.clone()) {
            pending.extend(tree.children(&table).iter().map(|r| r.output_table.clone()));
        }
    }

    let mut dropped = Vec::new();
    for table in &owned {
        if store.table_exists(table) {
            store.drop_table_if_exists(table)?;
            dropped.push(table.clone());
        }
    }
    let forgotten = forget_lineage(store, |t| owned.contains(t))?;
    info!(sample, tables = dropped.len(), lineage = forgotten, "dropped sample");
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::site_table;
    use crate::filter::{EditingType, EditingTypeFilter, QualityFilter, StageOutcome};
    use crate::site::fixtures::site;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        site_table(
            &mut store,
            "s1_rnavcf",
            &[
                site("chr1", 1, 10, 0, 30.0),
                site("chr1", 2, 5, 5, 30.0),
                site("chr1", 3, 0, 0, 30.0),
                site("chr1", 4, 3, 7, 30.0),
                site("chr1", 5, 100, 100, 30.0),
            ],
        );
        store
    }

    fn qc() -> Box<dyn FilterStage> {
        Box::new(QualityFilter::new(20.0, 5).unwrap())
    }

    #[test]
    fn chains_stages_and_records_lineage() {
        let mut store = store();
        let pipeline = Pipeline::new("s1", "rnavcf")
            .then(Box::new(EditingTypeFilter::new("AG".parse::<EditingType>().unwrap())), false)
            .then(qc(), true);
        let run = pipeline.run(&mut store).unwrap();

        assert_eq!(run.final_table, "s1_rnavcf_etfilter_A_G_qcfilter_20_5");
        assert_eq!(run.reports.len(), 2);
        assert_eq!(run.reports[1].input_rows, 5);
        assert_eq!(run.reports[1].output_rows, 4);
        assert!(run.reports.iter().all(|r| r.status == StageStatus::Succeeded));

        let tree = LineageTree::from_records(load_lineage(&store).unwrap());
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec!["s1_rnavcf"]);
        assert_eq!(tree.children("s1_rnavcf_etfilter_A_G")[0].stage, "qcfilter");
    }

    #[test]
    fn missing_input_fails_before_any_stage() {
        let mut store = MemoryStore::new();
        let err = Pipeline::new("s1", "rnavcf").then(qc(), false).run(&mut store).unwrap_err();
        assert!(matches!(err, FilterError::Store(_)));
        assert!(load_lineage(&store).unwrap().is_empty());
    }

    #[derive(Debug)]
    struct Inflating;

    impl FilterStage for Inflating {
        fn name(&self) -> &'static str {
            "inflate"
        }

        fn description(&self) -> &'static str {
            "writes every row twice"
        }

        fn parameters(&self) -> BTreeMap<String, String> {
            BTreeMap::new()
        }

        fn apply(
            &self,
            store: &mut dyn TabularStore,
            previous: &str,
            current: &str,
            _ctx: &StageContext,
        ) -> Result<StageOutcome> {
            crate::filter::prepare_output(store, "inflate", previous, current)?;
            let query = crate::store::Query::table(previous);
            let once = store.bulk_insert_from_query(current, &query)?;
            let twice = store.bulk_insert_from_query(current, &query)?;
            Ok(StageOutcome {
                rows_read: once,
                rows_written: once + twice,
                rows_skipped: 0,
            })
        }
    }

    #[test]
    fn subset_violation_halts_and_is_recorded() {
        let mut store = store();
        let pipeline = Pipeline::new("s1", "rnavcf")
            .then(Box::new(Inflating), false)
            .then(qc(), false);
        let err = pipeline.run(&mut store).unwrap_err();
        match err {
            FilterError::StageFailed { stage, source, .. } => {
                assert_eq!(stage, "inflate");
                assert!(matches!(*source, FilterError::SubsetViolation { input: 5, output: 10, .. }));
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }

        let lineage = load_lineage(&store).unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage[0].status, StageStatus::Failed);
        assert!(!store.table_exists("s1_rnavcf_inflate_qcfilter_20_5"));
    }

    #[test]
    fn dedup_post_step_restores_subset() {
        let mut store = store();
        let run = Pipeline::new("s1", "rnavcf")
            .then(Box::new(Inflating), true)
            .run(&mut store)
            .unwrap();
        assert_eq!(run.reports[0].deduplicated_rows, 5);
        assert_eq!(run.reports[0].output_rows, 5);
    }

    #[test]
    fn cancelled_stage_reports_cancelled() {
        let mut store = store();
        let token = crate::filter::CancellationToken::new();
        token.cancel();
        let err = Pipeline::new("s1", "rnavcf")
            .with_context(StageContext::default().with_cancellation(token))
            .then(qc(), false)
            .run(&mut store)
            .unwrap_err();
        assert!(matches!(err, FilterError::StageFailed { .. }));
        assert_eq!(load_lineage(&store).unwrap()[0].status, StageStatus::Cancelled);
    }

    #[test]
    fn drop_sample_removes_tables_and_lineage() {
        let mut store = store();
        site_table(&mut store, "s10_rnavcf", &[site("chr1", 1, 5, 5, 30.0)]);
        Pipeline::new("s1", "rnavcf").then(qc(), false).run(&mut store).unwrap();
        let dropped = drop_sample(&mut store, "s1", DEFAULT_SOURCES).unwrap();
        assert_eq!(dropped, vec!["s1_rnavcf", "s1_rnavcf_qcfilter_20_5"]);
        assert!(store.table_exists("s10_rnavcf"));
        assert!(load_lineage(&store).unwrap().is_empty());
    }

    #[test]
    fn drop_sample_spares_samples_sharing_a_name_prefix() {
        let mut store = store();
        site_table(&mut store, "s_rnavcf", &[site("chr1", 1, 5, 5, 30.0)]);
        site_table(&mut store, "s_b_rnavcf", &[site("chr1", 1, 5, 5, 30.0)]);
        Pipeline::new("s", "rnavcf").then(qc(), false).run(&mut store).unwrap();
        Pipeline::new("s_b", "rnavcf").then(qc(), false).run(&mut store).unwrap();

        let dropped = drop_sample(&mut store, "s", DEFAULT_SOURCES).unwrap();
        assert_eq!(dropped, vec!["s_rnavcf", "s_rnavcf_qcfilter_20_5"]);
        assert!(store.table_exists("s_b_rnavcf"));
        assert!(store.table_exists("s_b_rnavcf_qcfilter_20_5"));
        let lineage = load_lineage(&store).unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage[0].output_table, "s_b_rnavcf_qcfilter_20_5");
    }
}
