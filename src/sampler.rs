//! Periodic frequency sampling for one core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::platform::Platform;
use crate::schema::FrequencySample;

/// Stop signal owned by one orchestration and lent to its sampler.
///
/// Flips once, from running to stopped.
#[derive(Debug, Default)]
pub struct StopToken {
    stopped: AtomicBool,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Stops the token when the returned guard is dropped, unwinding included.
    pub fn stop_on_drop(&self) -> StopGuard<'_> {
        StopGuard { token: self }
    }
}

pub struct StopGuard<'a> {
    token: &'a StopToken,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.token.stop();
    }
}

/// Read `core_id` every `interval` until `token` is stopped.
///
/// Each iteration sleeps first, then re-checks the token, then reads, so the
/// loop ends at most one interval after `stop()` and the first reading is
/// taken one interval after the call. A zero interval yields no samples.
pub fn sample_loop<P: Platform + ?Sized>(
    platform: &P,
    core_id: usize,
    token: &StopToken,
    interval: Duration,
) -> Vec<FrequencySample> {
    sample_loop_after(platform, core_id, token, interval, Duration::ZERO)
}

/// Like [`sample_loop`], but waits `lead_in` before the first interval starts.
pub fn sample_loop_after<P: Platform + ?Sized>(
    platform: &P,
    core_id: usize,
    token: &StopToken,
    interval: Duration,
    lead_in: Duration,
) -> Vec<FrequencySample> {
    let mut samples = Vec::new();
    if interval.is_zero() {
        warn!("core {core_id}: zero sampling interval, no samples taken");
        return samples;
    }

    let start = Instant::now();
    debug!("core {core_id}: sampler started ({}ms)", interval.as_millis());
    if !lead_in.is_zero() {
        thread::sleep(lead_in);
    }

    loop {
        thread::sleep(interval);
        if !token.is_active() {
            break;
        }
        // Readings are kept as-is, 0.0 included.
        let frequency_mhz = platform.sample_frequency_mhz(core_id);
        samples.push(FrequencySample {
            offset_ms: start.elapsed().as_millis() as u64,
            frequency_mhz,
        });
    }

    debug!("core {core_id}: sampler stopped after {} samples", samples.len());
    samples
}
