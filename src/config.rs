use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cadence at which a core's frequency is read during a run.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Delay between starting the sampler and applying load.
pub const STARTUP_GRACE: Duration = Duration::from_millis(100);

/// Primitive operations per compute call; the deadline is checked between batches.
pub const BATCH_ITERATIONS: u64 = 10_000_000;

/// Default tick for the standalone fleet-wide monitor.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(with = "millis")]
    pub sample_interval: Duration,
    #[serde(with = "millis")]
    pub startup_grace: Duration,
    pub batch_iterations: u64,
    /// When set, fleet runs also record an all-cores timeline at this cadence.
    #[serde(with = "opt_millis")]
    pub monitor_interval: Option<Duration>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            sample_interval: SAMPLE_INTERVAL,
            startup_grace: STARTUP_GRACE,
            batch_iterations: BATCH_ITERATIONS,
            monitor_interval: None,
        }
    }
}

impl ProbeConfig {
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn with_batch_iterations(mut self, iterations: u64) -> Self {
        self.batch_iterations = iterations.max(1);
        self
    }

    pub fn with_monitor_interval(mut self, interval: Option<Duration>) -> Self {
        self.monitor_interval = interval;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_millis))
    }
}
