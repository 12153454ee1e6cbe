//! Error types for corefreq.
//!
//! Per-core outcomes that are expected (unsupported workload, no samples
//! collected) are reported through `BenchmarkResult`, not through this type.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("duration must be greater than 0")]
    InvalidDuration,

    #[error("core id {core_id} out of range, must be between 0 and {}", core_count.saturating_sub(1))]
    InvalidCore { core_id: usize, core_count: usize },

    #[error("sampling interval must be greater than 0")]
    InvalidInterval,

    #[error("unknown instruction set: {0} (available: avx128, avx256, avx512, amx, basic_add)")]
    UnknownWorkload(String),

    /// The OS refused to bind the thread to the core. Fatal for the whole run.
    #[error("failed to pin thread to core {core_id}: {source}")]
    Affinity {
        core_id: usize,
        #[source]
        source: io::Error,
    },

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("worker thread panicked: {0}")]
    Panicked(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Errors that mean the execution environment is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Affinity { .. } | Error::Panicked(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
