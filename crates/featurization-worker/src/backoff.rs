//! Exponential retry delays.

use pipeline_config_and_utils::FeaturizationConfig;
use std::time::Duration;

/// `delay = min(base * 2^attempt, max)`
///
/// | Attempt | Delay (defaults) |
/// |---------|------------------|
/// | 0       | 5s               |
/// | 1       | 10s              |
/// | 3       | 40s              |
/// | 6+      | 300s             |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &FeaturizationConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before retrying a hit that has failed `attempt` times before.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }
}
