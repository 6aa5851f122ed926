use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the [`QueryWatcher`](super::QueryWatcher).
///
/// Disabled by default; a disabled watcher does no work per statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Whether the watcher records anything.
    pub enabled: bool,
    /// Executions of one normalized pattern, within one window, at which the
    /// pattern is flagged as N+1 fan-out.
    pub n_plus_one_threshold: u32,
    /// Statements at or above this duration are kept as slow queries.
    /// Written as fractional milliseconds (`slow_query_threshold_ms = 0.5`).
    #[serde(rename = "slow_query_threshold_ms", with = "duration_ms")]
    pub slow_query_threshold: Duration,
    /// Cap on retained slow queries; overflow is only counted.
    pub max_slow_queries: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_plus_one_threshold: 3,
            slow_query_threshold: Duration::from_millis(100),
            max_slow_queries: 100,
        }
    }
}

impl WatcherConfig {
    /// Create a new configuration with defaults (disabled, threshold 3, 100ms).
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable recording.
    pub fn enable(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Set the N+1 threshold. Values below 2 are raised to 2, since a single
    /// execution can never be fan-out.
    pub fn with_n_plus_one_threshold(mut self, threshold: u32) -> Self {
        self.n_plus_one_threshold = threshold.max(2);
        self
    }

    /// Set the slow-query threshold.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn with_max_slow_queries(mut self, max: usize) -> Self {
        self.max_slow_queries = max;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        if d.subsec_nanos() % 1_000_000 == 0 {
            s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        } else {
            s.serialize_f64(d.as_secs_f64() * 1000.0)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match Millis::deserialize(d)? {
            Millis::Whole(ms) => Ok(Duration::from_millis(ms)),
            Millis::Fractional(ms) => Duration::try_from_secs_f64(ms / 1000.0)
                .map_err(|e| D::Error::custom(format!("invalid slow_query_threshold_ms: {e}"))),
        }
    }
}
