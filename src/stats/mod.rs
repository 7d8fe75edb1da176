//! Statistical scorers used by the LLR and Fisher/FDR stages.

mod fdr;
mod fisher;
mod llr;

pub use fdr::benjamini_hochberg;
pub use fisher::{fisher_exact_two_tailed, BackgroundRates};
pub use llr::{llr_judge, log10_likelihood, DEFAULT_LLR_THRESHOLD};

/// Editing level `alt / (ref + alt)`; `None` for zero depth.
pub fn editing_level(ref_count: u32, alt_count: u32) -> Option<f64> {
    crate::site::AlleleDepth::new(ref_count, alt_count).editing_level()
}
