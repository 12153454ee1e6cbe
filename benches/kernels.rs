//! Compute kernel benchmark suite
//!
//! One fixed-size batch per workload kind. Useful for picking `--batch`:
//! a batch should be short compared to the run duration.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use corefreq::kernels;
use corefreq::{LinuxPlatform, Platform, WorkloadKind};

fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_batch");
    let platform = LinuxPlatform::new();
    let iterations = 100_000u64;

    for kind in WorkloadKind::ALL {
        // Unsupported kinds would silently take the scalar path.
        if !platform.cpu_supports(kind) {
            continue;
        }
        group.throughput(Throughput::Elements(iterations));
        group.bench_with_input(BenchmarkId::new("run", kind.display_name()), &kind, |bencher, &kind| {
            bencher.iter(|| kernels::run(black_box(kind), black_box(iterations)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_batches);
criterion_main!(benches);
