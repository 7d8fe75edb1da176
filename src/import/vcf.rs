//! Single-sample VCF/BCF to the canonical site table.

use std::path::Path;

use rust_htslib::bcf::header::HeaderView;
use rust_htslib::bcf::record::{Genotype, GenotypeAllele};
use rust_htslib::bcf::{self, Read};
use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::filter::{BatchInserter, StageContext};
use crate::import::ImportSummary;
use crate::site::{normalize_chrom, site_schema, AlleleDepth, ChromStyle, SiteRecord, Strand};
use crate::store::TabularStore;

/// The one sample a site table is built from.
const SAMPLE: usize = 0;

fn single_base(allele: &[u8]) -> Option<char> {
    match allele {
        [base] if base.is_ascii_alphabetic() => Some(base.to_ascii_uppercase() as char),
        _ => None,
    }
}

/// `0/1`, `1|1`, `./.`; the separator before an allele carries its phasing.
fn genotype_text(genotype: &Genotype) -> String {
    let mut text = String::new();
    for (i, allele) in genotype.iter().enumerate() {
        if i > 0 {
            let phased = matches!(allele, GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing);
            text.push(if phased { '|' } else { '/' });
        }
        match allele {
            GenotypeAllele::Unphased(n) | GenotypeAllele::Phased(n) => text.push_str(&n.to_string()),
            _ => text.push('.'),
        }
    }
    if text.is_empty() {
        text.push('.');
    }
    text
}

/// Present (non-negative) values of one integer FORMAT field, or `None`
/// when the tag is absent or every value is missing.
fn format_integers(record: &bcf::Record, tag: &[u8]) -> Option<Vec<i32>> {
    let values = record.format(tag).integer().ok()?;
    let present: Vec<i32> = values.get(SAMPLE)?.iter().copied().filter(|v| *v >= 0).collect();
    (!present.is_empty()).then_some(present)
}

fn filter_text(record: &bcf::Record, header: &HeaderView) -> String {
    let names: Vec<String> = record
        .filters()
        .map(|id| String::from_utf8_lossy(&header.id_to_name(id)).into_owned())
        .collect();
    if names.is_empty() {
        ".".to_string()
    } else {
        names.join(";")
    }
}

/// The INFO column exactly as htslib formats it.
fn info_text(record: &bcf::Record) -> String {
    record
        .to_vcf_string()
        .ok()
        .and_then(|line| line.split('\t').nth(7).map(str::to_string))
        .unwrap_or_else(|| ".".to_string())
}

/// Build the site row for one decoded record.
///
/// Returns `Ok(None)` for records that are not single-base substitutions
/// (indels, no-call `ALT`). Only the first alternate allele of a
/// multi-allelic site is kept. A sample without `AD` counts is an error.
pub fn site_from_record(
    record: &bcf::Record,
    header: &HeaderView,
    style: ChromStyle,
) -> Result<Option<SiteRecord>> {
    let rid = record
        .rid()
        .ok_or_else(|| FilterError::Data("record has no contig".to_string()))?;
    let chrom = String::from_utf8_lossy(header.rid2name(rid)?).into_owned();
    let position = u64::try_from(record.pos() + 1)
        .map_err(|_| FilterError::Data(format!("invalid position {}", record.pos() + 1)))?;

    let alleles = record.alleles();
    let (Some(reference_base), Some(alternate_base)) = (
        alleles.first().and_then(|a| single_base(a)),
        alleles.get(1).and_then(|a| single_base(a)),
    ) else {
        return Ok(None);
    };

    let ad = record
        .format(b"AD")
        .integer()
        .map_err(|_| FilterError::Data(format!("{chrom}:{position} has no AD field")))?;
    let allele_depth = ad
        .get(SAMPLE)
        .ok_or_else(|| FilterError::Data(format!("{chrom}:{position} has no sample column")))
        .and_then(|values| AlleleDepth::from_ad(values))?;

    let quality = record.qual();
    let genotype = record
        .genotypes()
        .map(|g| genotype_text(&g.get(SAMPLE)))
        .unwrap_or_else(|_| ".".to_string());
    let id = String::from_utf8_lossy(&record.id()).into_owned();

    Ok(Some(SiteRecord {
        chromosome: normalize_chrom(&chrom, style),
        position,
        id: (id != ".").then_some(id),
        reference_base,
        alternate_base,
        quality: if quality.is_nan() { 0.0 } else { quality as f64 },
        filter_status: filter_text(record, header),
        info: info_text(record),
        genotype,
        allele_depth,
        total_depth: format_integers(record, b"DP").map(|v| v[0] as u32),
        genotype_quality: format_integers(record, b"GQ").map(|v| v[0].to_string()),
        phred_likelihoods: format_integers(record, b"PL").map(|v| {
            v.iter().map(i32::to_string).collect::<Vec<_>>().join(",")
        }),
        is_alu: false,
        strand: Strand::Forward,
        p_value: None,
        fdr: None,
    }))
}

/// Replace `table` with the sites of a VCF or BCF file (plain or bgzipped).
///
/// The file must carry at least one sample; the first is imported.
/// Records that fail to decode or lack allele depths are logged and
/// counted as malformed.
pub fn import_vcf(
    store: &mut dyn TabularStore,
    path: &Path,
    table: &str,
    style: ChromStyle,
    ctx: &StageContext,
) -> Result<ImportSummary> {
    let mut reader = bcf::Reader::from_path(path)?;
    let header = reader.header().clone();
    match header.sample_count() {
        0 => {
            return Err(FilterError::Data(format!(
                "{} has no sample column",
                path.display()
            )))
        }
        1 => {}
        n => warn!(path = %path.display(), samples = n, "importing the first sample only"),
    }

    store.drop_table_if_exists(table)?;
    store.create_table(table, &site_schema())?;

    let mut summary = ImportSummary::default();
    let mut inserter = BatchInserter::new(store, "import", table, ctx);
    for (index, result) in reader.records().enumerate() {
        summary.lines += 1;
        let site = result
            .map_err(FilterError::from)
            .and_then(|record| site_from_record(&record, &header, style));
        match site {
            Ok(Some(site)) => inserter.push(site.to_row())?,
            Ok(None) => summary.ignored += 1,
            Err(err) => {
                warn!(table, record = index + 1, %err, "skipping malformed VCF record");
                summary.malformed += 1;
            }
        }
    }
    summary.imported = inserter.finish()?;
    info!(
        table,
        imported = summary.imported,
        ignored = summary.ignored,
        malformed = summary.malformed,
        "imported VCF"
    );
    Ok(summary)
}
