//! Runs the workload and the sampler side by side on one core.

use std::thread;

use log::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::runner::WorkloadRunner;
use crate::sampler::{self, StopToken};
use crate::schema::{BenchmarkRequest, BenchmarkResult};

pub struct Orchestrator<P> {
    platform: P,
    config: ProbeConfig,
    runner: WorkloadRunner,
}

impl<P: Platform> Orchestrator<P> {
    pub fn new(platform: P, config: ProbeConfig) -> Self {
        let runner = WorkloadRunner::new(config.batch_iterations);
        Orchestrator {
            platform,
            config,
            runner,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Reject requests that cannot be run, before anything is started.
    pub fn validate(&self, request: &BenchmarkRequest) -> Result<()> {
        if request.duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        let core_count = self.platform.logical_core_count();
        if request.core_id >= core_count {
            return Err(Error::InvalidCore {
                core_id: request.core_id,
                core_count,
            });
        }
        Ok(())
    }

    /// Load `request.core_id` with `request.workload` for `request.duration`
    /// while sampling its frequency.
    ///
    /// The workload runs on the calling thread, which stays pinned to the
    /// core afterwards. The sampler runs on a scoped thread and starts
    /// `startup_grace` before the load; its first reading is taken no
    /// earlier than that.
    ///
    /// An unsupported workload returns `supported: false` without starting
    /// any thread. A pinning failure is returned as an error.
    pub fn run_single(&self, request: &BenchmarkRequest) -> Result<BenchmarkResult> {
        self.validate(request)?;
        self.run_validated(request)
    }

    pub(crate) fn run_validated(&self, request: &BenchmarkRequest) -> Result<BenchmarkResult> {
        let core_id = request.core_id;
        if !self.platform.cpu_supports(request.workload) {
            warn!(
                "core {core_id}: the CPU does not support {} instructions, skipping",
                request.workload
            );
            return Ok(BenchmarkResult::unsupported(request));
        }

        let interval = self.config.sample_interval;
        let grace = self.config.startup_grace;
        let lead_in = grace.saturating_sub(interval);
        let token = StopToken::new();

        let (samples, outcome) = thread::scope(|s| {
            let sampler = thread::Builder::new()
                .name(format!("sampler-{core_id}"))
                .spawn_scoped(s, || {
                    sampler::sample_loop_after(&self.platform, core_id, &token, interval, lead_in)
                });
            let sampler = match sampler {
                Ok(h) => h,
                Err(e) => return (Err(Error::Io(e)), None),
            };
            // The scope joins the sampler even when the workload panics.
            let stop = token.stop_on_drop();

            thread::sleep(grace);
            info!(
                "core {core_id}: running {} for {:.1}s",
                request.workload,
                request.duration.as_secs_f64()
            );
            let outcome = self
                .runner
                .run_for(&self.platform, request.workload, request.duration, core_id);

            drop(stop);
            let samples = sampler.join().map_err(|_| Error::Panicked("sampler"));
            (samples, Some(outcome))
        });

        let samples = samples?;
        let outcome = match outcome {
            Some(outcome) => outcome?,
            None => return Err(Error::Panicked("sampler")),
        };

        let result = BenchmarkResult::completed(request, samples, outcome.batches);
        if result.success {
            debug!(
                "core {core_id}: {} samples over {:.3}s, avg {:.1} MHz",
                result.sample_count(),
                outcome.elapsed.as_secs_f64(),
                result.avg_freq().unwrap_or_default()
            );
        } else {
            warn!("core {core_id}: no frequency measurements were taken");
        }
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::WorkloadKind;
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread::ThreadId;
    use std::time::{Duration, Instant};

    /// Deterministic stand-in for the machine.
    pub(crate) struct FakePlatform {
        pub cores: usize,
        pub unsupported: HashSet<WorkloadKind>,
        pub refuse_pin: Option<usize>,
        pub panic_in_workload: bool,
        pub pinned: Mutex<Vec<usize>>,
        pub pinned_on: Mutex<Vec<ThreadId>>,
        pub reads: AtomicUsize,
        pub batches: AtomicUsize,
    }

    impl FakePlatform {
        pub fn new(cores: usize) -> Self {
            FakePlatform {
                cores,
                unsupported: HashSet::new(),
                refuse_pin: None,
                panic_in_workload: false,
                pinned: Mutex::new(Vec::new()),
                pinned_on: Mutex::new(Vec::new()),
                reads: AtomicUsize::new(0),
                batches: AtomicUsize::new(0),
            }
        }

        pub fn without(mut self, kind: WorkloadKind) -> Self {
            self.unsupported.insert(kind);
            self
        }
    }

    impl Platform for FakePlatform {
        fn cpu_supports(&self, kind: WorkloadKind) -> bool {
            !self.unsupported.contains(&kind)
        }
        fn pin_current_thread_to(&self, core_id: usize) -> Result<()> {
            if self.refuse_pin == Some(core_id) {
                return Err(Error::Affinity {
                    core_id,
                    source: io::Error::from_raw_os_error(libc::EINVAL),
                });
            }
            self.pinned.lock().unwrap().push(core_id);
            self.pinned_on.lock().unwrap().push(thread::current().id());
            Ok(())
        }
        fn logical_core_count(&self) -> usize {
            self.cores
        }
        fn sample_frequency_mhz(&self, core_id: usize) -> f64 {
            self.reads.fetch_add(1, Ordering::SeqCst);
            2000.0 + 100.0 * core_id as f64
        }
        fn run_workload(&self, _kind: WorkloadKind, _iterations: u64) {
            if self.panic_in_workload {
                panic!("workload fault");
            }
            self.batches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub(crate) fn fast_config() -> ProbeConfig {
        ProbeConfig::default()
            .with_sample_interval(Duration::from_millis(20))
            .with_startup_grace(Duration::from_millis(20))
    }

    #[test]
    fn test_single_collects_samples() {
        let orch = Orchestrator::new(FakePlatform::new(2), fast_config());
        let req = BenchmarkRequest::new(WorkloadKind::Avx256, Duration::from_millis(200), 1);
        let r = orch.run_single(&req).unwrap();

        assert!(r.supported);
        assert!(r.success);
        assert_eq!(r.core_id, 1);
        // 200ms / 20ms, give or take the grace period and join latency.
        assert!((8..=12).contains(&r.sample_count()), "{}", r.sample_count());
        assert_eq!(r.min_freq(), Some(2100.0));
        assert_eq!(r.max_freq(), Some(2100.0));
        assert!(r.batches > 0);
        assert_eq!(*orch.platform().pinned.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_first_sample_not_before_grace() {
        let cfg = fast_config().with_startup_grace(Duration::from_millis(80));
        let orch = Orchestrator::new(FakePlatform::new(1), cfg);
        let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_millis(100), 0);
        let r = orch.run_single(&req).unwrap();
        assert!(r.samples[0].offset_ms >= 80, "{:?}", r.samples[0]);
    }

    #[test]
    fn test_unsupported_returns_fast_without_side_effects() {
        let orch = Orchestrator::new(FakePlatform::new(1).without(WorkloadKind::Amx), fast_config());
        let req = BenchmarkRequest::new(WorkloadKind::Amx, Duration::from_secs(1), 0);

        let start = Instant::now();
        let r = orch.run_single(&req).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        assert!(!r.supported);
        assert!(!r.success);
        assert!(r.samples.is_empty());
        assert!(orch.platform().pinned.lock().unwrap().is_empty());
        assert_eq!(orch.platform().reads.load(Ordering::SeqCst), 0);
        assert_eq!(orch.platform().batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let orch = Orchestrator::new(FakePlatform::new(4), fast_config());

        let zero = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::ZERO, 0);
        assert!(matches!(orch.run_single(&zero), Err(Error::InvalidDuration)));

        let far = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_secs(1), 4);
        let err = orch.run_single(&far).unwrap_err();
        assert!(matches!(err, Error::InvalidCore { core_id: 4, core_count: 4 }));
        assert!(err.to_string().contains("between 0 and 3"));

        assert_eq!(orch.platform().reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_run_without_samples_is_unsuccessful() {
        let cfg = ProbeConfig::default()
            .with_sample_interval(Duration::from_millis(500))
            .with_startup_grace(Duration::from_millis(1));
        let orch = Orchestrator::new(FakePlatform::new(1), cfg);
        let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_millis(10), 0);
        let r = orch.run_single(&req).unwrap();
        assert!(r.supported);
        assert!(!r.success);
        assert!(r.stats.is_none());
    }

    #[test]
    fn test_pin_failure_propagates() {
        let mut p = FakePlatform::new(2);
        p.refuse_pin = Some(1);
        let orch = Orchestrator::new(p, fast_config());
        let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_millis(50), 1);
        let err = orch.run_single(&req).unwrap_err();
        assert!(matches!(err, Error::Affinity { core_id: 1, .. }));
        assert!(err.is_fatal());
    }

    /// Runs `f` on a helper thread; `Some(panicked)` if it returned within `limit`.
    pub(crate) fn finishes_within<F>(limit: Duration, f: F) -> Option<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err();
            let _ = tx.send(panicked);
        });
        rx.recv_timeout(limit).ok()
    }

    #[test]
    fn test_workload_panic_propagates_instead_of_hanging() {
        let mut p = FakePlatform::new(1);
        p.panic_in_workload = true;
        let orch = Orchestrator::new(p, fast_config());
        let req = BenchmarkRequest::new(WorkloadKind::BasicAdd, Duration::from_secs(30), 0);
        let outcome = finishes_within(Duration::from_secs(3), move || {
            let _ = orch.run_single(&req);
        });
        assert_eq!(outcome, Some(true), "run_single blocked after a workload panic");
    }

    #[test]
    fn test_repeated_runs_have_same_shape() {
        let orch = Orchestrator::new(FakePlatform::new(1), fast_config());
        let req = BenchmarkRequest::new(WorkloadKind::Avx128, Duration::from_millis(60), 0);
        let a = orch.run_single(&req).unwrap();
        let b = orch.run_single(&req).unwrap();
        assert_eq!(a.supported, b.supported);
        assert_eq!(a.success, b.success);
        assert_eq!(a.stats.is_some(), b.stats.is_some());
        assert_eq!(a.samples.is_empty(), b.samples.is_empty());
    }
}
