use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use corefreq::{
    BenchmarkRequest, Error, FleetMode, LinuxPlatform, Orchestrator, Platform, ProbeConfig, Result,
    WorkloadKind,
};

/// Machine without AMX/AVX-512 whose reads occasionally fail.
struct Box4 {
    cores: usize,
    missing: HashSet<WorkloadKind>,
    reads: AtomicU64,
}

impl Box4 {
    fn new(cores: usize) -> Self {
        Box4 {
            cores,
            missing: [WorkloadKind::Amx, WorkloadKind::Avx512].into_iter().collect(),
            reads: AtomicU64::new(0),
        }
    }
}

impl Platform for Box4 {
    fn cpu_supports(&self, kind: WorkloadKind) -> bool {
        !self.missing.contains(&kind)
    }
    fn pin_current_thread_to(&self, core_id: usize) -> Result<()> {
        assert!(core_id < self.cores);
        Ok(())
    }
    fn logical_core_count(&self) -> usize {
        self.cores
    }
    fn sample_frequency_mhz(&self, core_id: usize) -> f64 {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        if n % 7 == 6 {
            0.0
        } else {
            3000.0 + (core_id as f64) * 10.0 + (n % 5) as f64 * 50.0
        }
    }
    fn run_workload(&self, _kind: WorkloadKind, _iterations: u64) {
        thread::sleep(Duration::from_millis(1));
    }
}

fn config() -> ProbeConfig {
    ProbeConfig::default()
        .with_sample_interval(Duration::from_millis(25))
        .with_startup_grace(Duration::from_millis(25))
}

#[test]
fn amx_on_cpu_without_amx_is_skipped_quickly() {
    let orch = Orchestrator::new(Box4::new(4), config());
    let req = BenchmarkRequest::new(WorkloadKind::Amx, Duration::from_secs(1), 0);
    let start = Instant::now();
    let r = orch.run_single(&req).unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));
    assert!(!r.supported);
    assert!(r.samples.is_empty());
    assert_eq!(orch.platform().reads.load(Ordering::Relaxed), 0);
}

#[test]
fn parallel_fleet_four_cores_all_successful() {
    let orch = Orchestrator::new(Box4::new(4), config());
    let duration = Duration::from_millis(300);
    let start = Instant::now();
    let report = orch.run_fleet_parallel(WorkloadKind::Avx256, duration).unwrap();
    let wall = start.elapsed();

    assert_eq!(report.core_count(), 4);
    assert_eq!(report.results.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    for r in report.results.values() {
        assert!(r.success);
        assert!(!r.samples.is_empty());
        let (min, avg, max) = (r.min_freq().unwrap(), r.avg_freq().unwrap(), r.max_freq().unwrap());
        assert!(0.0 <= min && min <= avg && avg <= max);
    }
    // Roughly one duration, not four.
    assert!(wall < duration * 2, "{wall:?}");
}

#[test]
fn sequential_fleet_scales_with_core_count() {
    let orch = Orchestrator::new(Box4::new(4), config());
    let duration = Duration::from_millis(100);
    let start = Instant::now();
    let report = orch.run_fleet_sequential(WorkloadKind::BasicAdd, duration).unwrap();
    let wall = start.elapsed();

    assert_eq!(report.mode, FleetMode::Sequential);
    assert_eq!(report.core_count(), 4);
    assert!(wall >= duration * 4, "{wall:?}");
    assert!(wall < duration * 4 + Duration::from_millis(4 * 150), "{wall:?}");
}

#[test]
fn mixed_fleet_reports_unsupported_cores_without_aborting() {
    let orch = Orchestrator::new(Box4::new(3), config());
    let report = orch.run_fleet_parallel(WorkloadKind::Avx512, Duration::from_millis(200)).unwrap();
    assert_eq!(report.core_count(), 3);
    assert_eq!(report.failed_cores(), vec![0, 1, 2]);
}

#[test]
fn sample_count_tracks_duration_over_interval() {
    let orch = Orchestrator::new(Box4::new(1), config());
    let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_millis(500), 0);
    let r = orch.run_single(&req).unwrap();
    // 500 / 25 = 20, allow for grace and join latency.
    assert!((18..=22).contains(&r.sample_count()), "{}", r.sample_count());
}

#[test]
fn out_of_range_core_rejected_before_start() {
    let orch = Orchestrator::new(Box4::new(2), config());
    let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_secs(1), 2);
    let start = Instant::now();
    assert!(matches!(orch.run_single(&req), Err(Error::InvalidCore { .. })));
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[cfg(target_os = "linux")]
#[test]
fn basic_add_on_real_machine() {
    let handle = thread::spawn(|| {
        let orch = Orchestrator::new(LinuxPlatform::new(), ProbeConfig::default().with_batch_iterations(100_000));
        // A core this thread may already run on, so pinning cannot be refused.
        let core = unsafe { libc::sched_getcpu() }.max(0) as usize;
        if core >= orch.platform().logical_core_count() {
            // Restricted cpuset numbering; nothing meaningful to check.
            return None;
        }
        let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_millis(600), core);
        Some(orch.run_single(&req))
    });
    let Some(r) = handle.join().unwrap() else {
        return;
    };
    let r = r.unwrap();
    assert!(r.supported);
    assert!(r.success);
    assert!(!r.samples.is_empty());
    assert!(0.0 <= r.min_freq().unwrap());
    assert!(r.min_freq().unwrap() <= r.max_freq().unwrap());
}
