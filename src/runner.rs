//! Keeps one pinned core saturated until a deadline.

use std::time::{Duration, Instant};

use log::debug;

use crate::config::BATCH_ITERATIONS;
use crate::error::Result;
use crate::platform::Platform;
use crate::WorkloadKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub batches: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct WorkloadRunner {
    batch_iterations: u64,
}

impl Default for WorkloadRunner {
    fn default() -> Self {
        WorkloadRunner {
            batch_iterations: BATCH_ITERATIONS,
        }
    }
}

impl WorkloadRunner {
    pub fn new(batch_iterations: u64) -> Self {
        WorkloadRunner {
            batch_iterations: batch_iterations.max(1),
        }
    }

    /// Pin the calling thread to `core_id` and run `kind` in batches until
    /// `duration` has elapsed.
    ///
    /// The deadline is only checked between batches, so the run may overrun
    /// by up to one batch. A pinning failure is returned untouched and must
    /// not be treated as a per-core result.
    pub fn run_for<P: Platform + ?Sized>(
        &self,
        platform: &P,
        kind: WorkloadKind,
        duration: Duration,
        core_id: usize,
    ) -> Result<RunOutcome> {
        platform.pin_current_thread_to(core_id)?;

        let start = Instant::now();
        let deadline = start + duration;
        let mut batches = 0u64;
        while Instant::now() < deadline {
            platform.run_workload(kind, self.batch_iterations);
            batches += 1;
        }

        let elapsed = start.elapsed();
        debug!(
            "core {core_id}: {kind} ran {batches} batches of {} in {:.3}s",
            self.batch_iterations,
            elapsed.as_secs_f64()
        );
        Ok(RunOutcome { batches, elapsed })
    }
}
