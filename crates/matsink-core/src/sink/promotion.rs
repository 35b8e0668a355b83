//! Promotion diagnostics.

use std::time::Duration;

use crate::config::LoggingConfig;

/// Logs tier promotions, escalating to `warn` past a threshold.
#[derive(Debug, Clone)]
pub(crate) struct PromotionLogger {
    threshold: Duration,
}

impl PromotionLogger {
    pub(crate) fn new(config: &LoggingConfig) -> Self {
        Self {
            threshold: Duration::from_millis(config.slow_promotion_ms),
        }
    }

    pub(crate) fn is_slow(&self, duration: Duration) -> bool {
        duration >= self.threshold
    }

    /// Returns true if the promotion was logged as slow.
    pub(crate) fn log(&self, alias: &str, rows: usize, duration: Duration) -> bool {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        if self.is_slow(duration) {
            tracing::warn!(
                alias,
                rows,
                duration_ms,
                threshold_ms = u64::try_from(self.threshold.as_millis()).unwrap_or(u64::MAX),
                "Slow promotion of temporary table to disk"
            );
            return true;
        }
        tracing::info!(alias, rows, duration_ms, "Temporary table promoted to disk");
        false
    }
}
