use statrs::function::factorial::ln_factorial;

use crate::error::FilterError;

// Relative tolerance when comparing table probabilities against the observed one.
const RELATIVE_TOLERANCE: f64 = 1e-7;

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Two-tailed Fisher's exact test for the 2x2 table `[[a, b], [c, d]]`.
///
/// Sums the hypergeometric probabilities of every table with the observed
/// margins that is no more likely than the observed one.
pub fn fisher_exact_two_tailed(a: u32, b: u32, c: u32, d: u32) -> f64 {
    let (a, b, c, d) = (a as u64, b as u64, c as u64, d as u64);
    let row1 = a + b;
    let row2 = c + d;
    let col1 = a + c;
    let n = row1 + row2;
    if n == 0 {
        return 1.0;
    }

    let ln_denominator = ln_choose(n, col1);
    let ln_prob = |x: u64| ln_choose(row1, x) + ln_choose(row2, col1 - x) - ln_denominator;

    let observed = ln_prob(a);
    let cutoff = observed + RELATIVE_TOLERANCE.ln_1p();
    let low = col1.saturating_sub(row2);
    let high = row1.min(col1);

    let p: f64 = (low..=high)
        .map(ln_prob)
        .filter(|&lp| lp <= cutoff)
        .map(f64::exp)
        .sum();
    p.clamp(0.0, 1.0)
}

/// Expected background read counts used as the second row of every
/// per-site Fisher table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundRates {
    /// Expected reference-supporting reads.
    pub ref_count: u32,
    /// Expected alternate-supporting reads.
    pub alt_count: u32,
}

impl BackgroundRates {
    /// Background from the alternate counts of known editing sites and the
    /// depths of sites not known to be edited, each averaged and rounded.
    pub fn estimate(known_alt_counts: &[u32], unknown_depths: &[u64]) -> Result<Self, FilterError> {
        if known_alt_counts.is_empty() {
            return Err(FilterError::Numeric(
                "no candidate site is a known editing site; cannot estimate background alternate count"
                    .to_string(),
            ));
        }
        if unknown_depths.is_empty() {
            return Err(FilterError::Numeric(
                "every candidate site is a known editing site; cannot estimate background reference count"
                    .to_string(),
            ));
        }
        let mean = |sum: f64, n: usize| (sum / n as f64).round() as u32;
        let alt_sum: f64 = known_alt_counts.iter().map(|&c| c as f64).sum();
        let ref_sum: f64 = unknown_depths.iter().map(|&d| d as f64).sum();
        Ok(Self {
            ref_count: mean(ref_sum, unknown_depths.len()),
            alt_count: mean(alt_sum, known_alt_counts.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matches_reference_values() {
        // R: fisher.test(matrix(c(3, 1, 1, 3), nrow = 2))$p.value
        assert_relative_eq!(fisher_exact_two_tailed(3, 1, 1, 3), 0.4857143, epsilon = 1e-6);
        // R: fisher.test(matrix(c(10, 0, 0, 10), nrow = 2))$p.value
        assert_relative_eq!(fisher_exact_two_tailed(10, 0, 0, 10), 1.082509e-05, epsilon = 1e-9);
    }

    #[test]
    fn identical_rows_are_not_significant() {
        assert_relative_eq!(fisher_exact_two_tailed(5, 5, 5, 5), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_table_is_one() {
        assert_eq!(fisher_exact_two_tailed(0, 0, 0, 0), 1.0);
        assert_eq!(fisher_exact_two_tailed(0, 0, 4, 2), 1.0);
    }

    #[test]
    fn large_counts_stay_in_range() {
        let p = fisher_exact_two_tailed(4_000, 12, 30, 30);
        assert!((0.0..=1.0).contains(&p));
        assert!(p < 1e-10);
    }

    #[test]
    fn background_requires_known_sites() {
        assert!(matches!(
            BackgroundRates::estimate(&[], &[10, 20]),
            Err(FilterError::Numeric(_))
        ));
        assert!(matches!(
            BackgroundRates::estimate(&[3], &[]),
            Err(FilterError::Numeric(_))
        ));
    }

    #[test]
    fn background_rounds_means() {
        let rates = BackgroundRates::estimate(&[3, 4], &[10, 11]).unwrap();
        assert_eq!(rates, BackgroundRates { ref_count: 11, alt_count: 4 });
    }
}
