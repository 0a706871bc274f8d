//! Interval growth between polls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed step added by [`BackoffStrategy::Linear`].
pub const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// How the wait between two polls grows over a continuous run.
///
/// There is no ceiling; a long exponential run keeps doubling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    None,
    #[default]
    Linear,
    Exponential,
}

impl BackoffStrategy {
    pub fn next_interval(self, current: Duration) -> Duration {
        match self {
            BackoffStrategy::None => current,
            BackoffStrategy::Linear => current.saturating_add(BACKOFF_UNIT),
            BackoffStrategy::Exponential => current.saturating_mul(2),
        }
    }
}

/// Polling cadence: the first wait and how it grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub initial_interval: Duration,
    pub backoff: BackoffStrategy,
}

impl PollingConfig {
    pub fn new(initial_interval: Duration, backoff: BackoffStrategy) -> Self {
        Self {
            initial_interval,
            backoff,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval: BACKOFF_UNIT,
            backoff: BackoffStrategy::Linear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_interval() {
        let current = Duration::from_secs(3);
        assert_eq!(BackoffStrategy::None.next_interval(current), current);
    }

    #[test]
    fn linear_adds_one_unit() {
        assert_eq!(
            BackoffStrategy::Linear.next_interval(Duration::from_secs(1)),
            Duration::from_secs(2)
        );
        assert_eq!(
            BackoffStrategy::Linear.next_interval(Duration::from_millis(500)),
            Duration::from_millis(1_500)
        );
    }

    #[test]
    fn exponential_doubles() {
        assert_eq!(
            BackoffStrategy::Exponential.next_interval(Duration::from_secs(4)),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn growth_never_decreases() {
        for strategy in [
            BackoffStrategy::None,
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
        ] {
            let mut interval = Duration::from_secs(1);
            for _ in 0..20 {
                let next = strategy.next_interval(interval);
                assert!(next >= interval, "{strategy:?} shrank the interval");
                interval = next;
            }
        }
    }

    #[test]
    fn exponential_saturates_instead_of_overflowing() {
        assert_eq!(
            BackoffStrategy::Exponential.next_interval(Duration::MAX),
            Duration::MAX
        );
        assert_eq!(
            BackoffStrategy::Linear.next_interval(Duration::MAX),
            Duration::MAX
        );
    }

    #[test]
    fn default_config_is_one_second_linear() {
        let config = PollingConfig::default();
        assert_eq!(config.initial_interval, Duration::from_secs(1));
        assert_eq!(config.backoff, BackoffStrategy::Linear);
    }
}
