//! Statistics reduction benchmark suite
//!
//! Measures reducing a sample timeline to min/max/mean and thinning it for
//! display, at timeline lengths from a one-second run up to an hour.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use corefreq::report::timeline_rows;
use corefreq::schema::{FrequencySample, FrequencyStats};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn timeline(len: usize, seed: u64) -> Vec<FrequencySample> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|i| FrequencySample {
            offset_ms: (i as u64 + 1) * 100,
            frequency_mhz: 800.0 + (rng.next_u32() % 4_800) as f64,
        })
        .collect()
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats_reduce");

    // 1s, 1min, 10min, 1h at 100ms cadence
    for len in [10usize, 600, 6_000, 36_000] {
        let samples = timeline(len, 42);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("from_samples", len), &samples, |bencher, s| {
            bencher.iter(|| FrequencyStats::from_samples(black_box(s)))
        });
        group.bench_with_input(BenchmarkId::new("timeline_rows", len), &samples, |bencher, s| {
            bencher.iter(|| black_box(timeline_rows(black_box(s))).len())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reduce);
criterion_main!(benches);
