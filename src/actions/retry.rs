//! Retry policy and backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy attached to an action at registration time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; an always-failing action runs
    /// `max_retries + 1` times
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_backoff_ms: u64,
        backoff_multiplier: f64,
        max_backoff_ms: u64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            backoff_multiplier,
            max_backoff_ms,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failure on `attempt_number` (1-based) earns another attempt
    pub fn should_retry(&self, attempt_number: u32) -> bool {
        attempt_number <= self.max_retries
    }

    /// `min(initial * multiplier^attempt, max)`
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Duration {
        let exponent = i32::try_from(attempt_number).unwrap_or(i32::MAX);
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_backoff_ms as f64)
        } else {
            self.max_backoff_ms as f64
        };
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_backoff_ms < 1 {
            return Err("initial_backoff_ms must be at least 1".to_string());
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 1.0 {
            return Err("backoff_multiplier must be greater than 1".to_string());
        }
        if self.max_backoff_ms <= self.initial_backoff_ms {
            return Err("max_backoff_ms must be greater than initial_backoff_ms".to_string());
        }
        Ok(())
    }
}
