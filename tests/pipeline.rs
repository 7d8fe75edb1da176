#[path = "common/mod.rs"]
mod common;

use common::{assert_snapshot, import, load_reference, positions, text_column, Site};
use resift::config::PipelineConfig;
use resift::filter::{QualityFilter, StageRegistry};
use resift::import::ReferenceKind;
use resift::pipeline::{
    drop_sample, fingerprint, load_lineage, LineageTree, Pipeline, StageStatus, DEFAULT_SOURCES,
};
use resift::store::{MemoryStore, SqliteStore, TabularStore};
use resift::FilterError;

#[test]
fn five_site_quality_scenario() {
    let mut store = MemoryStore::new();
    let sites: Vec<Site> = [(10, 0), (5, 5), (0, 0), (3, 7), (100, 100)]
        .iter()
        .enumerate()
        .map(|(i, &(r, a))| Site::ag(i as u64 + 1, r, a))
        .collect();
    import(&mut store, "scenario_rnavcf", &sites);

    let run = Pipeline::new("scenario", "rnavcf")
        .then(Box::new(QualityFilter::new(20.0, 5).expect("valid thresholds")), false)
        .run(&mut store)
        .expect("pipeline runs");

    assert_eq!(run.final_table, "scenario_rnavcf_qcfilter_20_5");
    assert_eq!(positions(&store, &run.final_table), vec![1, 2, 4, 5]);
    assert_eq!(run.reports[0].input_rows, 5);
    assert_eq!(run.reports[0].output_rows, 4);
}

const CONFIG: &str = r#"{
  "sample": "HepG2",
  "stages": [
    { "stage": "etfilter", "params": { "ref_alt": "AG" } },
    { "stage": "qcfilter", "params": { "quality": "20", "depth": "6" } },
    { "stage": "dbsnpfilter", "params": { "reference": "dbsnp" } },
    { "stage": "rrfilter", "params": { "reference": "rmsk" } },
    { "stage": "sjfilter", "params": { "reference": "gtf" } }
  ]
}"#;

fn fill_hepg2(store: &mut dyn TabularStore) {
    import(
        store,
        "HepG2_rnavcf",
        &[
            Site::ag(100, 10, 10),
            Site::ag(200, 1, 1),
            Site::ag(300, 10, 10),
            Site::ag(400, 10, 10),
            Site::ag(500, 10, 10),
            Site::ag(600, 10, 10),
            Site::ag(700, 10, 10).bases('C', 'T'),
            Site::ag(800, 10, 10).bases('T', 'C'),
        ],
    );
    load_reference(store, ReferenceKind::KnownSnp, "dbsnp", "1\t300\n");
    load_reference(
        store,
        ReferenceKind::Repeat,
        "rmsk",
        "chr1\t390\t410\tLINE/L1\nchr1\t490\t510\tSINE/Alu\n",
    );
    load_reference(
        store,
        ReferenceKind::GeneModel,
        "gtf",
        "chr1\tsrc\tCDS\t602\t700\t.\t+\t0\tgene_id \"g1\";\n",
    );
}

fn hepg2_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    fill_hepg2(&mut store);
    store
}

fn run_config(store: &mut dyn TabularStore) -> String {
    let config = PipelineConfig::from_json(CONFIG).expect("valid config");
    Pipeline::from_config(&config, &StageRegistry::with_builtin())
        .expect("stages build")
        .run(store)
        .expect("pipeline runs")
        .final_table
}

#[test]
fn configured_chain_narrows_and_records_lineage() {
    let mut store = hepg2_store();
    let config = PipelineConfig::from_json(CONFIG).expect("valid config");
    let pipeline =
        Pipeline::from_config(&config, &StageRegistry::with_builtin()).expect("stages build");
    let run = pipeline.run(&mut store).expect("pipeline runs");

    assert_eq!(
        run.final_table,
        "HepG2_rnavcf_etfilter_A_G_qcfilter_20_6_dbsnpfilter_dbsnp_rrfilter_rmsk_prefer_alu_sjfilter_gtf_2"
    );
    let counts: Vec<usize> = run.reports.iter().map(|r| r.output_rows).collect();
    assert_eq!(counts, vec![7, 6, 5, 4, 3]);
    assert_eq!(positions(&store, &run.final_table), vec![100, 500, 800]);
    assert_eq!(text_column(&store, &run.final_table, "ALU"), vec!["F", "T", "F"]);
    assert_eq!(text_column(&store, &run.final_table, "STRAND"), vec!["+", "+", "-"]);

    let tree = LineageTree::from_records(load_lineage(&store).expect("lineage"));
    assert_snapshot("lineage/hepg2.txt", &tree.render());
}

#[test]
fn rerun_replaces_lineage_instead_of_duplicating() {
    let mut store = hepg2_store();
    let config = PipelineConfig::from_json(CONFIG).expect("valid config");
    let pipeline =
        Pipeline::from_config(&config, &StageRegistry::with_builtin()).expect("stages build");
    pipeline.run(&mut store).expect("first run");
    let first = pipeline.run(&mut store).expect("second run");

    let lineage = load_lineage(&store).expect("lineage");
    assert_eq!(lineage.len(), 5);
    assert_eq!(positions(&store, &first.final_table), vec![100, 500, 800]);
}

#[test]
fn missing_reference_halts_at_failed_stage() {
    let mut store = hepg2_store();
    store.drop_table_if_exists("rmsk").expect("drop");
    let config = PipelineConfig::from_json(CONFIG).expect("valid config");
    let err = Pipeline::from_config(&config, &StageRegistry::with_builtin())
        .expect("stages build")
        .run(&mut store)
        .expect_err("repeat stage must fail");

    match err {
        FilterError::StageFailed { stage, table, .. } => {
            assert_eq!(stage, "rrfilter");
            assert_eq!(table, "HepG2_rnavcf_etfilter_A_G_qcfilter_20_6_dbsnpfilter_dbsnp_rrfilter_rmsk_prefer_alu");
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }

    let lineage = load_lineage(&store).expect("lineage");
    let statuses: Vec<StageStatus> = lineage.iter().map(|r| r.status).collect();
    assert_eq!(statuses.iter().filter(|s| **s == StageStatus::Succeeded).count(), 3);
    assert_eq!(statuses.iter().filter(|s| **s == StageStatus::Failed).count(), 1);
    assert!(!store
        .list_tables()
        .iter()
        .any(|t| t.ends_with("_sjfilter_gtf_2")));
}

#[test]
fn bad_parameters_fail_before_any_stage_runs() {
    let config = PipelineConfig::from_json(
        r#"{"sample": "HepG2", "stages": [
            {"stage": "etfilter", "params": {"ref_alt": "AG"}},
            {"stage": "qcfilter", "params": {"quality": "high", "depth": "6"}}
        ]}"#,
    )
    .expect("valid json");
    let err = Pipeline::from_config(&config, &StageRegistry::with_builtin()).unwrap_err();
    assert!(matches!(err, FilterError::InvalidParameter { .. }));
}

#[test]
fn sqlite_backend_matches_memory_backend() {
    let mut memory = hepg2_store();
    let mut sqlite = SqliteStore::in_memory().expect("sqlite store");
    fill_hepg2(&mut sqlite);

    let final_memory = run_config(&mut memory);
    let final_sqlite = run_config(&mut sqlite);
    assert_eq!(final_memory, final_sqlite);
    assert_eq!(positions(&sqlite, &final_sqlite), vec![100, 500, 800]);
    assert_eq!(
        fingerprint(&sqlite, &final_sqlite).expect("fingerprint"),
        fingerprint(&memory, &final_memory).expect("fingerprint")
    );
    assert_eq!(
        LineageTree::from_records(load_lineage(&sqlite).expect("lineage")).render(),
        LineageTree::from_records(load_lineage(&memory).expect("lineage")).render()
    );
}

#[test]
fn sqlite_file_survives_reopen_and_drop_sample() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("resift.sqlite");
    let tables = {
        let mut store = SqliteStore::open(&path).expect("open store");
        fill_hepg2(&mut store);
        run_config(&mut store);
        store.list_tables()
    };

    let mut reopened = SqliteStore::open(&path).expect("reopen store");
    assert_eq!(reopened.list_tables(), tables);
    assert_eq!(load_lineage(&reopened).expect("lineage").len(), 5);

    let dropped = drop_sample(&mut reopened, "HepG2", DEFAULT_SOURCES).expect("drop sample");
    assert_eq!(dropped.len(), 6);
    assert_eq!(reopened.list_tables(), vec!["dbsnp", "gtf", "lineage", "rmsk"]);
    assert!(load_lineage(&reopened).expect("lineage").is_empty());
}

#[test]
fn drop_sample_leaves_samples_whose_names_it_prefixes() {
    let mut store = MemoryStore::new();
    import(&mut store, "s_rnavcf", &[Site::ag(1, 10, 10)]);
    import(&mut store, "s_b_rnavcf", &[Site::ag(1, 10, 10)]);
    for sample in ["s", "s_b"] {
        Pipeline::new(sample, "rnavcf")
            .then(Box::new(QualityFilter::new(20.0, 5).expect("valid thresholds")), false)
            .run(&mut store)
            .expect("pipeline runs");
    }

    let dropped = drop_sample(&mut store, "s", DEFAULT_SOURCES).expect("drop sample");
    assert_eq!(dropped, vec!["s_rnavcf", "s_rnavcf_qcfilter_20_5"]);
    assert_eq!(
        store.list_tables(),
        vec!["lineage", "s_b_rnavcf", "s_b_rnavcf_qcfilter_20_5"]
    );
    let lineage = load_lineage(&store).expect("lineage");
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].parent_table, "s_b_rnavcf");
}
