//! Multi-core runs: every logical core, in parallel or one at a time.

use std::panic;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::monitor::FleetMonitor;
use crate::orchestrator::Orchestrator;
use crate::platform::Platform;
use crate::sampler::StopToken;
use crate::schema::{BenchmarkRequest, BenchmarkResult, FleetMode, FleetReport};
use crate::WorkloadKind;

/// Notified once per core as its run completes. Calls may come from
/// several threads at once.
pub trait FleetObserver: Sync {
    fn core_finished(&self, result: &BenchmarkResult);
}

pub struct NoopObserver;

impl FleetObserver for NoopObserver {
    fn core_finished(&self, _result: &BenchmarkResult) {}
}

/// One pre-sized slot per core. Slot `i` is written only by the run for
/// core `i`, and only once.
struct ResultSlots {
    slots: Vec<OnceLock<BenchmarkResult>>,
}

impl ResultSlots {
    fn new(cores: usize) -> Self {
        ResultSlots {
            slots: (0..cores).map(|_| OnceLock::new()).collect(),
        }
    }

    fn fill(&self, result: BenchmarkResult) {
        let core_id = result.core_id;
        let written = self.slots[core_id].set(result).is_ok();
        debug_assert!(written, "slot {core_id} written twice");
    }

    fn into_report(self, report: &mut FleetReport) {
        for slot in self.slots {
            if let Some(result) = slot.into_inner() {
                report.insert(result);
            }
        }
    }
}

impl<P: Platform> Orchestrator<P> {
    /// Run every logical core at once, each on its own pinned thread.
    pub fn run_fleet_parallel(&self, workload: WorkloadKind, duration: Duration) -> Result<FleetReport> {
        self.run_fleet(workload, duration, FleetMode::Parallel, &NoopObserver)
    }

    /// Run every logical core in ascending order, one at a time.
    pub fn run_fleet_sequential(&self, workload: WorkloadKind, duration: Duration) -> Result<FleetReport> {
        self.run_fleet(workload, duration, FleetMode::Sequential, &NoopObserver)
    }

    /// Run all cores and return one result per core.
    ///
    /// Per-core problems (unsupported workload, no samples) show up as
    /// unsuccessful entries. A pinning failure on any core fails the whole
    /// fleet once the in-flight cores reach their deadline.
    pub fn run_fleet(
        &self,
        workload: WorkloadKind,
        duration: Duration,
        mode: FleetMode,
        observer: &dyn FleetObserver,
    ) -> Result<FleetReport> {
        if duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        let cores = self.platform().logical_core_count();
        info!(
            "{} fleet: {workload} on {cores} cores for {:.1}s",
            mode.as_str(),
            duration.as_secs_f64()
        );

        let mut report = FleetReport::new(workload, mode, duration);
        let monitor = self.config().monitor_interval.map(FleetMonitor::new);
        let token = StopToken::new();
        let start = Instant::now();

        let (outcome, timeline) = thread::scope(|s| {
            // Auxiliary all-cores timeline; never waited on by the per-core runs.
            let timeline = monitor.as_ref().map(|m| {
                let token = &token;
                s.spawn(move || m.record(self.platform(), token, |_| {}))
            });
            let stop = token.stop_on_drop();

            let outcome = match mode {
                FleetMode::Parallel => self.fan_out(workload, duration, cores, observer),
                FleetMode::Sequential => {
                    self.one_by_one(workload, duration, cores, observer, &mut report)
                }
            };

            drop(stop);
            let timeline = timeline.map(|h| h.join().map_err(|_| Error::Panicked("fleet monitor")));
            (outcome, timeline)
        });

        if let Some(slots) = outcome? {
            slots.into_report(&mut report);
        }
        report.fleet_timeline = timeline.transpose()?;
        report.wall_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "fleet done in {}ms, {} of {cores} cores successful",
            report.wall_time_ms,
            report.successful().count()
        );
        Ok(report)
    }

    fn fan_out(
        &self,
        workload: WorkloadKind,
        duration: Duration,
        cores: usize,
        observer: &dyn FleetObserver,
    ) -> Result<Option<ResultSlots>> {
        // Pool threads get pinned, so the pool lives only for this run.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cores)
            .thread_name(|i| format!("corefreq-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let slots = ResultSlots::new(cores);
        let fatal: OnceLock<Error> = OnceLock::new();

        pool.scope(|s| {
            for core_id in 0..cores {
                let slots = &slots;
                let fatal = &fatal;
                s.spawn(move |_| {
                    let request = BenchmarkRequest::new(workload, duration, core_id);
                    match self.run_validated(&request) {
                        Ok(result) => {
                            observer.core_finished(&result);
                            slots.fill(result);
                        }
                        Err(e) => {
                            let _ = fatal.set(e);
                        }
                    }
                });
            }
        });

        match fatal.into_inner() {
            Some(e) => Err(e),
            None => Ok(Some(slots)),
        }
    }

    fn one_by_one(
        &self,
        workload: WorkloadKind,
        duration: Duration,
        cores: usize,
        observer: &dyn FleetObserver,
        report: &mut FleetReport,
    ) -> Result<Option<ResultSlots>> {
        // Each core gets a fresh thread, so no run inherits the previous
        // core's pin and the caller stays unpinned.
        for core_id in 0..cores {
            let request = BenchmarkRequest::new(workload, duration, core_id);
            let result = thread::scope(|s| -> Result<BenchmarkResult> {
                let worker = thread::Builder::new()
                    .name(format!("corefreq-{core_id}"))
                    .spawn_scoped(s, || self.run_validated(&request))?;
                worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload))
            })?;
            observer.core_finished(&result);
            report.insert(result);
        }
        Ok(None)
    }
}
