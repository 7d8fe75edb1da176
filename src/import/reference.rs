//! Loaders for the annotation files stages consult.
//!
//! All inputs are tab-separated text; blank lines and `#` comments are
//! skipped, and rows that do not parse are logged and counted.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::filter::{BatchInserter, StageContext};
use crate::import::ImportSummary;
use crate::reference::{interval_schema, known_editing_schema, known_snp_schema};
use crate::store::{Row, Schema, TabularStore, Value};

/// Kind of annotation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Known SNPs: `chrom pos` or VCF lines.
    KnownSnp,
    /// Repeat intervals: `chrom begin end type`.
    Repeat,
    /// GTF gene model.
    GeneModel,
    /// Known editing sites: `chrom coordinate strand inchr inrna`.
    Darned,
}

impl ReferenceKind {
    const ALL: [ReferenceKind; 4] = [
        ReferenceKind::KnownSnp,
        ReferenceKind::Repeat,
        ReferenceKind::GeneModel,
        ReferenceKind::Darned,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::KnownSnp => "dbsnp",
            ReferenceKind::Repeat => "repeat",
            ReferenceKind::GeneModel => "gtf",
            ReferenceKind::Darned => "darned",
        }
    }

    /// Load `reader` into `table`, replacing it.
    pub fn load(
        self,
        store: &mut dyn TabularStore,
        reader: impl BufRead,
        table: &str,
        ctx: &StageContext,
    ) -> Result<ImportSummary> {
        match self {
            ReferenceKind::KnownSnp => load_known_snps(store, reader, table, ctx),
            ReferenceKind::Repeat => load_repeats(store, reader, table, ctx),
            ReferenceKind::GeneModel => load_gene_model(store, reader, table, ctx),
            ReferenceKind::Darned => load_darned(store, reader, table, ctx),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ReferenceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = ReferenceKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown reference kind '{s}' (expected one of {})", known.join(", "))
            })
    }
}

fn coordinate(raw: &str) -> Result<Value> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|c| *c >= 1)
        .map(Value::Int)
        .ok_or_else(|| FilterError::Data(format!("invalid coordinate '{raw}'")))
}

fn column<'a>(fields: &[&'a str], index: usize) -> Result<&'a str> {
    fields
        .get(index)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| FilterError::Data(format!("missing column {}", index + 1)))
}

fn load_rows(
    store: &mut dyn TabularStore,
    reader: impl BufRead,
    table: &str,
    schema: &Schema,
    ctx: &StageContext,
    parse: impl Fn(&[&str]) -> Result<Option<Row>>,
) -> Result<ImportSummary> {
    store.drop_table_if_exists(table)?;
    store.create_table(table, schema)?;

    let mut summary = ImportSummary::default();
    let mut inserter = BatchInserter::new(store, "load-reference", table, ctx);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        let fields: Vec<&str> = line.split('\t').collect();
        match parse(&fields) {
            Ok(Some(row)) => inserter.push(row)?,
            Ok(None) => summary.ignored += 1,
            Err(err) => {
                warn!(table, line = index + 1, %err, "skipping malformed reference line");
                summary.malformed += 1;
            }
        }
    }
    summary.imported = inserter.finish()?;
    info!(table, imported = summary.imported, malformed = summary.malformed, "loaded reference");
    Ok(summary)
}

/// Known SNP positions from `chrom pos ...` lines (plain or VCF).
pub fn load_known_snps(
    store: &mut dyn TabularStore,
    reader: impl BufRead,
    table: &str,
    ctx: &StageContext,
) -> Result<ImportSummary> {
    load_rows(store, reader, table, &known_snp_schema(), ctx, |fields| {
        Ok(Some(vec![
            Value::from(column(fields, 0)?),
            coordinate(column(fields, 1)?)?,
        ]))
    })
}

/// Repeat intervals from `chrom begin end type` lines.
pub fn load_repeats(
    store: &mut dyn TabularStore,
    reader: impl BufRead,
    table: &str,
    ctx: &StageContext,
) -> Result<ImportSummary> {
    load_rows(store, reader, table, &interval_schema(), ctx, |fields| {
        interval_row(column(fields, 0)?, column(fields, 1)?, column(fields, 2)?, column(fields, 3)?)
    })
}

/// Gene model features from GTF; column 3 is the feature type.
pub fn load_gene_model(
    store: &mut dyn TabularStore,
    reader: impl BufRead,
    table: &str,
    ctx: &StageContext,
) -> Result<ImportSummary> {
    load_rows(store, reader, table, &interval_schema(), ctx, |fields| {
        interval_row(column(fields, 0)?, column(fields, 3)?, column(fields, 4)?, column(fields, 2)?)
    })
}

fn interval_row(chrom: &str, begin: &str, end: &str, kind: &str) -> Result<Option<Row>> {
    let (begin, end) = (coordinate(begin)?, coordinate(end)?);
    if end.as_i64() < begin.as_i64() {
        return Err(FilterError::Data(format!("interval {chrom}:{begin}-{end} ends before it begins")));
    }
    Ok(Some(vec![Value::from(chrom), begin, end, Value::from(kind)]))
}

/// Known editing sites from `chrom coordinate strand inchr inrna` lines.
pub fn load_darned(
    store: &mut dyn TabularStore,
    reader: impl BufRead,
    table: &str,
    ctx: &StageContext,
) -> Result<ImportSummary> {
    load_rows(store, reader, table, &known_editing_schema(), ctx, |fields| {
        Ok(Some(vec![
            Value::from(column(fields, 0)?),
            coordinate(column(fields, 1)?)?,
            Value::from(fields.get(3).copied().unwrap_or_default().trim()),
            Value::from(fields.get(4).copied().unwrap_or_default().trim()),
        ]))
    })
}
