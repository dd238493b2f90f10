use std::env;
use std::time::Duration;

/// Timing knobs for the lifecycle engine. The engine takes this struct by
/// value so tests can substitute short deadlines for the production ones.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Upper bound on a single probe call.
    pub probe_timeout: Duration,
    /// Upper bound on a whole install/uninstall/restart operation.
    pub operation_timeout: Duration,
    /// How many times the underlying action is attempted before the
    /// component transitions to Error.
    pub retry_max: u32,
    /// Base delay for exponential backoff between action attempts.
    pub retry_backoff: Duration,
    /// Interval between ground-truth checks while waiting for an action to
    /// take effect. Also the interval clients are expected to poll at.
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(15 * 60),
            retry_max: 3,
            retry_backoff: Duration::from_secs(5),
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            probe_timeout: env_secs("THARNAX_PROBE_TIMEOUT_SECS").unwrap_or(defaults.probe_timeout),
            operation_timeout: env_secs("THARNAX_OPERATION_TIMEOUT_SECS")
                .unwrap_or(defaults.operation_timeout),
            retry_max: env::var("THARNAX_RETRY_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_max),
            retry_backoff: env_secs("THARNAX_RETRY_BACKOFF_SECS").unwrap_or(defaults.retry_backoff),
            poll_interval: env_secs("THARNAX_POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
        }
    }

    /// Backoff before the given (1-based) retry attempt: base * 2^(attempt-1).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}
