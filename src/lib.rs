use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod fleet;
pub mod kernels;
pub mod monitor;
pub mod orchestrator;
pub mod platform;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod schema;

pub use config::ProbeConfig;
pub use error::{Error, Result};
pub use fleet::{FleetObserver, NoopObserver};
pub use orchestrator::Orchestrator;
pub use platform::{LinuxPlatform, Platform};
pub use schema::{BenchmarkRequest, BenchmarkResult, FleetMode, FleetReport, FrequencySample};

/// Instruction-set stress pattern driven on the pinned core.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// 128-bit SIMD (AVX-128 when available, SSE otherwise).
    #[value(alias = "sse", alias = "128")]
    Avx128,
    /// 256-bit SIMD (AVX2).
    #[value(alias = "avx2", alias = "256")]
    Avx256,
    /// 512-bit SIMD (AVX-512F).
    #[value(alias = "512")]
    Avx512,
    /// Matrix-tile stand-in (scalar register traffic, gated on AMX support).
    Amx,
    /// Scalar integer ADD chain; supported everywhere.
    #[value(name = "basic_add", alias = "basic-add", alias = "add", alias = "basic")]
    BasicAdd,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 5] = [
        WorkloadKind::Avx128,
        WorkloadKind::Avx256,
        WorkloadKind::Avx512,
        WorkloadKind::Amx,
        WorkloadKind::BasicAdd,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            WorkloadKind::Avx128 => "AVX128/SSE",
            WorkloadKind::Avx256 => "AVX256",
            WorkloadKind::Avx512 => "AVX512",
            WorkloadKind::Amx => "AMX",
            WorkloadKind::BasicAdd => "Basic ADD",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for WorkloadKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // ignore_case matches the aliases the CLI accepts.
        <WorkloadKind as ValueEnum>::from_str(s, true)
            .map_err(|_| Error::UnknownWorkload(s.to_string()))
    }
}
