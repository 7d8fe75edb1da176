//! # resift: staged filtering of RNA-editing candidate sites
//!
//! Candidate sites called from RNA-seq are narrowed down by a chain of
//! table-to-table filter stages. Every stage reads the previous site table
//! from a [`TabularStore`](store::TabularStore) and writes a strict subset
//! of it under a derived table name, so each intermediate result stays
//! inspectable and the chain of stages is recorded as lineage.
//!
//! ## Stages
//!
//! 1. **Quality/depth**: `QUAL` and `REF_COUNT + ALT_COUNT` thresholds
//! 2. **Known SNP**: anti-join against a known-variant table
//! 3. **Repeat region**: drop repeats, keep and flag SINE/Alu sites
//! 4. **Splice junction**: drop sites near CDS boundaries
//! 5. **Editing type**: keep one base change on either strand
//! 6. **DNA/RNA**: keep sites homozygous-reference in matched DNA
//! 7. **LLR**: likelihood-ratio test against matched DNA
//! 8. **Fisher + FDR**: exact test against background rates, BH-adjusted
//!
//! ## Usage Example
//!
//! ```ignore
//! use resift::filter::{EditingType, EditingTypeFilter, QualityFilter};
//! use resift::pipeline::Pipeline;
//! use resift::store::SqliteStore;
//!
//! let mut store = SqliteStore::open(Path::new("resift.sqlite"))?;
//! resift::import::import_vcf(&mut store, Path::new("HepG2.vcf"), "HepG2_rnavcf", style, &ctx)?;
//! let run = Pipeline::new("HepG2", "rnavcf")
//!     .then(Box::new(EditingTypeFilter::new("AG".parse()?)), false)
//!     .then(Box::new(QualityFilter::new(20.0, 6)?), false)
//!     .run(&mut store)?;
//! assert_eq!(run.final_table, "HepG2_rnavcf_etfilter_A_G_qcfilter_20_6");
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod config;    // JSON pipeline definitions
pub mod error;     // Store and pipeline errors
pub mod filter;    // Filter stages and their registry
pub mod import;    // VCF and annotation loaders
pub mod logging;   // Subscriber setup
pub mod pipeline;  // Stage chaining, naming, lineage
pub mod reference; // Annotation lookup indexes
pub mod site;      // Site records and table layout
pub mod stats;     // LLR, Fisher's exact test, BH
pub mod store;     // Tabular store boundary

// Re-exports for convenience
pub use config::{ConfigError, PipelineConfig, StageConfig};
pub use error::{FilterError, Result, StoreError};
pub use filter::{FilterStage, StageContext, StageOutcome, StageRegistry};
pub use pipeline::{Pipeline, PipelineRun, StageReport, TableName};
pub use site::{SiteKey, SiteRecord};
pub use store::{MemoryStore, SqliteStore, TabularStore};
