//! Benchmarks for the CPU-bound parts of a cycle.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fraudflow::config::FeatureConfig;
use fraudflow::scoring::FraudThreshold;
use fraudflow::source::RecordValidator;
use fraudflow::core::Cursor;
use fraudflow::testing::{sample_event, sample_row};
use fraudflow::transform::FeatureTransformer;

fn transform_benchmark(c: &mut Criterion) {
    let Ok(transformer) = FeatureTransformer::new(FeatureConfig::default()) else {
        return;
    };
    let events: Vec<_> = (0..1_000)
        .map(|i| sample_event(&format!("T{i}"), 1_700_000_000_000 + i, 10.0 + i as f64))
        .collect();

    c.bench_function("transform_batch_1000", |b| {
        b.iter(|| black_box(transformer.transform_batch(black_box(&events))))
    });
}

fn window_benchmark(c: &mut Criterion) {
    let validator = RecordValidator::permissive();
    let rows: Vec<_> = (0..1_000)
        .map(|i| sample_row(&format!("T{}", i % 900), 1_700_000_000_000 + i, 5.0))
        .collect();

    c.bench_function("build_batch_1000", |b| {
        b.iter(|| {
            black_box(validator.build_batch(
                rows.iter().cloned().map(Ok),
                &Cursor::start(),
                500,
            ))
        })
    });
}

fn classify_benchmark(c: &mut Criterion) {
    let threshold = FraudThreshold::default();
    let probabilities: Vec<f64> = (0..10_000).map(|i| f64::from(i) / 10_000.0).collect();

    c.bench_function("classify_10000", |b| {
        b.iter(|| {
            probabilities
                .iter()
                .filter(|p| threshold.classify(black_box(**p)))
                .count()
        })
    });
}

criterion_group!(benches, transform_benchmark, window_benchmark, classify_benchmark);
criterion_main!(benches);
