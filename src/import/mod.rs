//! Importers feeding the store: VCF/BCF through htslib, annotations as text.

mod reference;
mod vcf;

pub use reference::{load_darned, load_gene_model, load_known_snps, load_repeats, ReferenceKind};
pub use vcf::{import_vcf, site_from_record};

/// Record accounting for one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Data records (or lines) seen, headers and comments excluded.
    pub lines: usize,
    /// Rows written.
    pub imported: usize,
    /// Well-formed records that are not candidate sites.
    pub ignored: usize,
    /// Records that failed to decode.
    pub malformed: usize,
}
