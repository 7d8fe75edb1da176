use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use resift::config::{PipelineConfig, StageConfig};
use resift::filter::{distinct, StageContext, StageRegistry};
use resift::import::{import_vcf, ReferenceKind};
use resift::pipeline::{drop_sample, load_lineage, LineageTree, Pipeline, TableName, DEFAULT_SOURCES};
use resift::site::ChromStyle;
use resift::store::{SqliteStore, TabularStore};

#[derive(Parser, Debug)]
#[command(name = "resift", about = "Staged filtering of RNA-editing candidate sites")]
struct Cli {
    /// SQLite database holding every table; created if absent.
    #[arg(long, global = true, default_value = "resift.sqlite")]
    store: PathBuf,
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a single-sample VCF or BCF as `{sample}_{source}`.
    Import {
        /// VCF/BCF file, optionally bgzipped.
        vcf: PathBuf,
        /// Sample name.
        #[arg(long)]
        sample: String,
        /// Source tag (`rnavcf` or `dnavcf`).
        #[arg(long, default_value = "rnavcf")]
        source: String,
        /// Chromosome naming to store (`prefixed` or `bare`).
        #[arg(long, default_value = "prefixed")]
        chrom_style: ChromStyle,
        /// Rows per committed batch.
        #[arg(long, default_value_t = resift::filter::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Load an annotation file into a reference table.
    LoadReference {
        /// One of `dbsnp`, `repeat`, `gtf`, `darned`.
        kind: ReferenceKind,
        /// Annotation file.
        file: PathBuf,
        /// Destination table.
        table: String,
    },
    /// Run a chain of filter stages over a sample.
    Run {
        /// Pipeline definition (JSON).
        #[arg(long, conflicts_with_all = ["sample", "stage"])]
        config: Option<PathBuf>,
        /// Sample name, when stages are given inline.
        #[arg(long, required_unless_present = "config")]
        sample: Option<String>,
        /// Source tag of the input table.
        #[arg(long, default_value = "rnavcf")]
        source: String,
        /// Inline stage, `name:key=value,...`; repeat in application order.
        /// A trailing `+dedup` on the name collapses duplicate output rows.
        #[arg(long = "stage")]
        stage: Vec<String>,
        /// Rows per committed batch.
        #[arg(long, default_value_t = resift::filter::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Collapse duplicate rows of a table in place.
    Dedup {
        /// Table to deduplicate.
        table: String,
    },
    /// Print the filter tree recorded in the lineage table.
    Lineage,
    /// List tables with their row counts.
    Tables,
    /// Drop every table of a sample and its lineage.
    DropSample {
        /// Sample name.
        sample: String,
        /// Source tags the sample was imported under; repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// List the available filter stages.
    Stages,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    resift::logging::init(cli.verbose);

    match cli.command {
        Commands::Import {
            vcf,
            sample,
            source,
            chrom_style,
            batch_size,
        } => run_import(&cli.store, &vcf, &sample, &source, chrom_style, batch_size)?,
        Commands::LoadReference { kind, file, table } => {
            run_load_reference(&cli.store, kind, &file, &table)?
        }
        Commands::Run {
            config,
            sample,
            source,
            stage,
            batch_size,
        } => {
            let config = match config {
                Some(path) => PipelineConfig::load(&path)?,
                None => inline_config(sample, source, &stage, batch_size)?,
            };
            run_pipeline(&cli.store, &config)?
        }
        Commands::Dedup { table } => {
            let mut store = open_store(&cli.store)?;
            let removed = distinct(&mut store, &table)
                .with_context(|| format!("failed to deduplicate '{table}'"))?;
            println!("{table}\tremoved={removed}");
        }
        Commands::Lineage => {
            let store = open_store(&cli.store)?;
            let records = load_lineage(&store).context("failed to read lineage")?;
            if records.is_empty() {
                println!("No stages recorded.");
            } else {
                print!("{}", LineageTree::from_records(records).render());
            }
        }
        Commands::Tables => {
            let store = open_store(&cli.store)?;
            for table in store.list_tables() {
                println!("{table}\t{}", store.row_count(&table)?);
            }
        }
        Commands::DropSample { sample, sources } => {
            let mut store = open_store(&cli.store)?;
            let sources: Vec<&str> = if sources.is_empty() {
                DEFAULT_SOURCES.to_vec()
            } else {
                sources.iter().map(String::as_str).collect()
            };
            let dropped = drop_sample(&mut store, &sample, &sources)?;
            for table in dropped {
                println!("dropped\t{table}");
            }
        }
        Commands::Stages => {
            for info in StageRegistry::with_builtin().list() {
                println!("{}\t[{}]\t{}", info.name, info.parameters.join(", "), info.description);
            }
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("failed to open store {}", path.display()))
}

fn open_reader(path: &Path) -> Result<impl BufRead> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn run_import(
    store_path: &Path,
    vcf: &Path,
    sample: &str,
    source: &str,
    style: ChromStyle,
    batch_size: usize,
) -> Result<()> {
    let mut store = open_store(store_path)?;
    let table = TableName::base(sample, source);
    let summary = import_vcf(
        &mut store,
        vcf,
        table.as_str(),
        style,
        &StageContext::with_batch_size(batch_size),
    )
    .with_context(|| format!("failed to import {}", vcf.display()))?;
    println!(
        "{table}\timported={}\tignored={}\tmalformed={}",
        summary.imported, summary.ignored, summary.malformed
    );
    Ok(())
}

fn run_load_reference(store_path: &Path, kind: ReferenceKind, file: &Path, table: &str) -> Result<()> {
    let mut store = open_store(store_path)?;
    let summary = kind
        .load(&mut store, open_reader(file)?, table, &StageContext::default())
        .with_context(|| format!("failed to load {kind} reference {}", file.display()))?;
    println!("{table}\timported={}\tmalformed={}", summary.imported, summary.malformed);
    Ok(())
}

/// Parse `name[+dedup]:key=value,key=value`.
fn parse_stage(raw: &str) -> Result<StageConfig> {
    let (head, tail) = raw.split_once(':').unwrap_or((raw, ""));
    let (name, dedup) = match head.strip_suffix("+dedup") {
        Some(name) => (name, true),
        None => (head, false),
    };
    if name.trim().is_empty() {
        bail!("stage '{raw}' has no name");
    }
    let mut params = BTreeMap::new();
    for pair in tail.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value in stage '{raw}', found '{pair}'"))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(StageConfig {
        stage: name.trim().to_string(),
        params,
        dedup,
    })
}

fn inline_config(
    sample: Option<String>,
    source: String,
    stages: &[String],
    batch_size: usize,
) -> Result<PipelineConfig> {
    let sample = sample.ok_or_else(|| anyhow!("--sample is required without --config"))?;
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    let mut config = PipelineConfig::new(&sample);
    config.source = source;
    config.batch_size = batch_size;
    config.stages = stages.iter().map(|s| parse_stage(s)).collect::<Result<_>>()?;
    Ok(config)
}

fn run_pipeline(store_path: &Path, config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::from_config(config, &StageRegistry::with_builtin())
        .context("invalid pipeline definition")?;
    let mut store = open_store(store_path)?;
    let run = pipeline
        .run(&mut store)
        .with_context(|| format!("pipeline for sample '{}' failed", config.sample))?;

    for report in &run.reports {
        println!(
            "{}\t{} -> {}\t{} -> {} rows\tskipped={}\tdeduplicated={}\t{}ms",
            report.stage,
            report.input_table,
            report.output_table,
            report.input_rows,
            report.output_rows,
            report.skipped_rows,
            report.deduplicated_rows,
            report.finished_ms - report.started_ms,
        );
    }
    println!("final\t{}", run.final_table);
    Ok(())
}
