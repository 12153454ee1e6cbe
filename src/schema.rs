use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ProbeConfig;
use crate::WorkloadKind;

/// Input to one core's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkRequest {
    pub workload: WorkloadKind,
    pub duration: Duration,
    pub core_id: usize,
}

impl BenchmarkRequest {
    pub fn new(workload: WorkloadKind, duration: Duration, core_id: usize) -> Self {
        BenchmarkRequest {
            workload,
            duration,
            core_id,
        }
    }
}

/// One frequency reading, offset from the start of sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencySample {
    pub offset_ms: u64,
    pub frequency_mhz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyStats {
    pub min_mhz: f64,
    pub max_mhz: f64,
    pub avg_mhz: f64,
}

impl FrequencyStats {
    /// Min/max/arithmetic mean over the readings. `None` for an empty slice.
    ///
    /// Zero readings are counted like any other value.
    pub fn from_samples(samples: &[FrequencySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for s in samples {
            min = min.min(s.frequency_mhz);
            max = max.max(s.frequency_mhz);
            sum += s.frequency_mhz;
        }
        // Rounding in the sum can push the mean a hair outside [min, max].
        let avg = (sum / samples.len() as f64).clamp(min, max);

        Some(FrequencyStats {
            min_mhz: min,
            max_mhz: max,
            avg_mhz: avg,
        })
    }
}

/// Per-core outcome.
///
/// `supported == false` means nothing ran: `stats` is `None`, `samples` is empty.
/// `supported && !success` means the run happened but no sample was collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub core_id: usize,
    pub workload: WorkloadKind,
    pub supported: bool,
    pub success: bool,
    pub duration_ms: u64,
    /// Compute batches executed before the deadline.
    pub batches: u64,
    pub stats: Option<FrequencyStats>,
    pub samples: Vec<FrequencySample>,
}

impl BenchmarkResult {
    pub fn unsupported(request: &BenchmarkRequest) -> Self {
        BenchmarkResult {
            core_id: request.core_id,
            workload: request.workload,
            supported: false,
            success: false,
            duration_ms: request.duration.as_millis() as u64,
            batches: 0,
            stats: None,
            samples: Vec::new(),
        }
    }

    pub fn completed(request: &BenchmarkRequest, samples: Vec<FrequencySample>, batches: u64) -> Self {
        let stats = FrequencyStats::from_samples(&samples);
        BenchmarkResult {
            core_id: request.core_id,
            workload: request.workload,
            supported: true,
            success: stats.is_some(),
            duration_ms: request.duration.as_millis() as u64,
            batches,
            stats,
            samples,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn min_freq(&self) -> Option<f64> {
        self.stats.map(|s| s.min_mhz)
    }

    pub fn max_freq(&self) -> Option<f64> {
        self.stats.map(|s| s.max_mhz)
    }

    pub fn avg_freq(&self) -> Option<f64> {
        self.stats.map(|s| s.avg_mhz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetMode {
    Parallel,
    Sequential,
}

impl FleetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetMode::Parallel => "parallel",
            FleetMode::Sequential => "sequential",
        }
    }
}

/// One tick of the all-cores monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSample {
    pub offset_ms: u64,
    pub per_core_mhz: Vec<f64>,
    pub average_mhz: f64,
}

/// Result of a multi-core run: exactly one entry per logical core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetReport {
    pub workload: WorkloadKind,
    pub mode: FleetMode,
    pub duration_ms: u64,
    pub wall_time_ms: u64,
    pub results: BTreeMap<usize, BenchmarkResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet_timeline: Option<Vec<FleetSample>>,
}

impl FleetReport {
    pub fn new(workload: WorkloadKind, mode: FleetMode, duration: Duration) -> Self {
        FleetReport {
            workload,
            mode,
            duration_ms: duration.as_millis() as u64,
            wall_time_ms: 0,
            results: BTreeMap::new(),
            fleet_timeline: None,
        }
    }

    pub(crate) fn insert(&mut self, result: BenchmarkResult) {
        let prev = self.results.insert(result.core_id, result);
        debug_assert!(prev.is_none(), "core reported twice");
    }

    pub fn core_count(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> impl Iterator<Item = &BenchmarkResult> {
        self.results.values().filter(|r| r.success)
    }

    pub fn failed_cores(&self) -> Vec<usize> {
        self.results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.core_id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub model: String,
    pub logical_cores: usize,
    pub features: Vec<FeatureFlag>,
    pub workloads: BTreeMap<String, bool>,
    pub core0_mhz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub tool_version: String,
    pub timestamp_utc: String,
    pub config: ProbeConfig,
}

/// JSON envelope printed with `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport<T> {
    pub run: RunMeta,
    pub result: T,
}
