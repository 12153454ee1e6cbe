//! All-cores frequency timeline.
//!
//! Used alongside fleet runs and by the standalone `monitor` command.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::sampler::StopToken;
use crate::schema::FleetSample;

#[derive(Clone, Copy, Debug)]
pub struct FleetMonitor {
    interval: Duration,
}

impl FleetMonitor {
    pub fn new(interval: Duration) -> Self {
        FleetMonitor { interval }
    }

    /// Read every logical core once per interval until `token` is stopped.
    pub fn record<P, F>(&self, platform: &P, token: &StopToken, mut on_tick: F) -> Vec<FleetSample>
    where
        P: Platform + ?Sized,
        F: FnMut(&FleetSample),
    {
        let mut rows = Vec::new();
        if self.interval.is_zero() {
            return rows;
        }

        let cores = platform.logical_core_count();
        let start = Instant::now();
        loop {
            thread::sleep(self.interval);
            if !token.is_active() {
                break;
            }
            let row = snapshot(platform, cores, start.elapsed());
            on_tick(&row);
            rows.push(row);
        }
        debug!("fleet monitor stopped after {} rows", rows.len());
        rows
    }

    /// Record for a fixed `duration`, calling `on_tick` for every row.
    pub fn watch<P, F>(&self, platform: &P, duration: Duration, on_tick: F) -> Result<Vec<FleetSample>>
    where
        P: Platform + ?Sized,
        F: FnMut(&FleetSample) + Send,
    {
        if self.interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        if duration.is_zero() {
            return Err(Error::InvalidDuration);
        }

        let token = StopToken::new();
        thread::scope(|s| {
            let rows = s.spawn(|| self.record(platform, &token, on_tick));
            thread::sleep(duration);
            token.stop();
            rows.join().map_err(|_| Error::Panicked("fleet monitor"))
        })
    }
}

fn snapshot<P: Platform + ?Sized>(platform: &P, cores: usize, offset: Duration) -> FleetSample {
    let per_core_mhz: Vec<f64> = (0..cores).map(|c| platform.sample_frequency_mhz(c)).collect();
    let average_mhz = if per_core_mhz.is_empty() {
        0.0
    } else {
        per_core_mhz.iter().sum::<f64>() / per_core_mhz.len() as f64
    };
    FleetSample {
        offset_ms: offset.as_millis() as u64,
        per_core_mhz,
        average_mhz,
    }
}
