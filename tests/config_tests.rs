//! Configuration defaults and derived values.

use std::time::Duration;

use tharnax::config::lifecycle::LifecycleConfig;
use tharnax::config::Config;

#[test]
fn lifecycle_defaults_match_the_documented_timings() {
    let config = LifecycleConfig::default();

    assert_eq!(config.probe_timeout, Duration::from_secs(5));
    assert_eq!(config.operation_timeout, Duration::from_secs(15 * 60));
    assert_eq!(config.retry_max, 3);
    assert_eq!(config.retry_backoff, Duration::from_secs(5));
    assert_eq!(config.poll_interval, Duration::from_secs(3));
}

#[test]
fn backoff_doubles_per_attempt() {
    let config = LifecycleConfig::default();

    assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(5));
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(10));
    assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(20));
}

#[test]
fn log_level_defaults_to_info() {
    let config = Config::from_env();
    assert_eq!(config.log_level, "info");
}

#[test]
fn backoff_handles_attempt_zero() {
    let config = LifecycleConfig::default();
    // attempt is 1-based; 0 is clamped rather than underflowing
    assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(5));
}
