use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loadtest_analyzer::binning::{AggregationType, BinManager};
use loadtest_analyzer::utils::{percentile, NumberFormat};

fn response_times(count: usize) -> Vec<(i64, f64)> {
    // Roughly 20 samples per second with a sawtooth of response times.
    (0..count)
        .map(|i| ((i as i64) * 50, ((i % 97) * 13 + 20) as f64))
        .collect()
}

fn bench_add_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_manager_add_value");
    for &count in &[10_000usize, 100_000] {
        let samples = response_times(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &samples, |b, samples| {
            b.iter(|| {
                let mut bins = BinManager::new(0, 1000).unwrap();
                for &(ts, value) in samples {
                    bins.add_value(ts, Some(value)).unwrap();
                }
                black_box(bins.bins().len())
            })
        });
    }
    group.finish();
}

fn bench_to_csv(c: &mut Criterion) {
    let mut bins = BinManager::new(0, 1000).unwrap();
    for (ts, value) in response_times(100_000) {
        bins.add_value(ts, Some(value)).unwrap();
    }
    let format = NumberFormat::integer();

    let mut group = c.benchmark_group("bin_manager_to_csv");
    for aggregation in [AggregationType::Count, AggregationType::Mean, AggregationType::Median] {
        group.bench_function(aggregation.to_string(), |b| {
            b.iter(|| {
                let mut out = Vec::with_capacity(64 * 1024);
                bins.to_csv(&mut out, "seconds", "value", &format, aggregation)
                    .unwrap();
                black_box(out.len())
            })
        });
    }
    group.finish();
}

fn bench_percentile(c: &mut Criterion) {
    let values: Vec<f64> = response_times(100_000).into_iter().map(|(_, v)| v).collect();
    c.bench_function("percentile_p90_100k", |b| {
        b.iter(|| black_box(percentile(black_box(&values), 90.0)))
    });
}

criterion_group!(benches, bench_add_value, bench_to_csv, bench_percentile);
criterion_main!(benches);
