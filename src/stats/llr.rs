/// Judge threshold used when a stage is not given one.
pub const DEFAULT_LLR_THRESHOLD: f64 = 4.0;

/// `log10(f^ref * (1-f)^alt)` at the maximum-likelihood `f = ref/(ref+alt)`.
///
/// Accumulated in log space so large depths do not underflow. A zero count
/// contributes nothing (`0 * log 0 = 0`), so pure-reference and pure-alternate
/// sites score 0. Returns `None` for zero depth.
pub fn log10_likelihood(ref_count: u32, alt_count: u32) -> Option<f64> {
    let total = ref_count as u64 + alt_count as u64;
    if total == 0 {
        return None;
    }
    let f_ml = ref_count as f64 / total as f64;
    let term = |count: u32, p: f64| {
        if count == 0 {
            0.0
        } else {
            // p == 0 with a positive count gives -inf, which fails any threshold.
            count as f64 * p.log10()
        }
    };
    Some(term(ref_count, f_ml) + term(alt_count, 1.0 - f_ml))
}

/// LLR judge `log10_likelihood + quality / 10`; `None` for zero depth.
pub fn llr_judge(ref_count: u32, alt_count: u32, quality: f64) -> Option<f64> {
    log10_likelihood(ref_count, alt_count).map(|y| y + quality / 10.0)
}
