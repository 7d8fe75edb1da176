//! Scorer benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resift::stats::{benjamini_hochberg, fisher_exact_two_tailed, llr_judge};

fn benchmark_scorers(c: &mut Criterion) {
    c.bench_function("fisher_exact_depth_200", |b| {
        b.iter(|| fisher_exact_two_tailed(black_box(120), black_box(80), black_box(180), black_box(25)));
    });

    c.bench_function("llr_judge_depth_1000", |b| {
        b.iter(|| llr_judge(black_box(600), black_box(400), black_box(45.0)));
    });

    let p_values: Vec<f64> = (0..100_000u32)
        .map(|i| ((i.wrapping_mul(2_654_435_761) % 1_000_003) as f64) / 1_000_003.0)
        .collect();
    c.bench_function("benjamini_hochberg_100k", |b| {
        b.iter(|| benjamini_hochberg(black_box(&p_values)));
    });
}

criterion_group!(benches, benchmark_scorers);
criterion_main!(benches);
