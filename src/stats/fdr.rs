/// Benjamini-Hochberg step-up adjustment.
///
/// The output lines up with the input. NaN entries stay NaN and do not
/// count towards the number of tests. Each adjusted value is the smallest
/// `p * m / rank` over its own rank and every larger one, capped at 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut adjusted = vec![f64::NAN; p_values.len()];
    let mut ranked: Vec<usize> = (0..p_values.len()).filter(|&i| !p_values[i].is_nan()).collect();
    ranked.sort_unstable_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let tests = ranked.len() as f64;
    let mut ceiling = 1.0_f64;
    for (rank, &i) in ranked.iter().enumerate().rev() {
        ceiling = ceiling.min(p_values[i] * tests / (rank + 1) as f64);
        adjusted[i] = ceiling;
    }
    adjusted
}
