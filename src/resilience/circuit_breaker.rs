//! # Circuit Breaker
//!
//! Fault isolation for external collaborators that may hang or fail
//! repeatedly. Closed lets calls through, Open fails fast, Half-Open lets a
//! limited number of probes through to test recovery.

use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Point-in-time counters for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub total_calls: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub rejected_calls: u64,
}

#[inline]
fn epoch_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

/// Lock-free circuit breaker; every field is an atomic so callers never await
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    opened_at_epoch_nanos: AtomicU64,
    total_calls: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    half_open_successes: AtomicU64,
    half_open_probes: AtomicU64,
    rejected_calls: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout.as_secs(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            opened_at_epoch_nanos: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            half_open_successes: AtomicU64::new(0),
            half_open_probes: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Decide whether the next call may proceed
    ///
    /// An open circuit whose timeout has elapsed moves to half-open and admits
    /// up to `success_threshold` probes.
    pub fn should_allow(&self) -> bool {
        let allowed = match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened = self.opened_at_epoch_nanos.load(Ordering::Acquire);
                let elapsed = epoch_nanos_now().saturating_sub(opened);
                if elapsed >= self.config.timeout.as_nanos() as u64 {
                    self.transition_to_half_open();
                    self.half_open_probes.fetch_add(1, Ordering::AcqRel);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let probes = self.half_open_probes.fetch_add(1, Ordering::AcqRel);
                probes < self.config.success_threshold as u64
            }
        };

        if !allowed {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    pub fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Protected call succeeded"
        );

        match self.state() {
            CircuitState::Closed => self.consecutive_failures.store(0, Ordering::Relaxed),
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold as u64 {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Protected call failed"
        );

        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold as u64 {
                    self.transition_to_open();
                }
            }
            // a failed probe reopens immediately
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }

    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    fn transition_to_open(&self) {
        self.opened_at_epoch_nanos
            .store(epoch_nanos_now(), Ordering::Release);
        self.half_open_successes.store(0, Ordering::Relaxed);
        self.half_open_probes.store(0, Ordering::Relaxed);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            component = %self.name,
            consecutive_failures = self.consecutive_failures.load(Ordering::Relaxed),
            timeout_seconds = self.config.timeout.as_secs(),
            "Circuit breaker opened"
        );
    }

    fn transition_to_half_open(&self) {
        self.half_open_successes.store(0, Ordering::Relaxed);
        self.half_open_probes.store(0, Ordering::Relaxed);
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        info!(component = %self.name, "Circuit breaker half-open");
    }

    fn transition_to_closed(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.half_open_successes.store(0, Ordering::Relaxed);
        self.half_open_probes.store(0, Ordering::Relaxed);
        self.opened_at_epoch_nanos.store(0, Ordering::Release);
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        info!(component = %self.name, "Circuit breaker closed (recovered)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            timeout,
            success_threshold: 2,
        }
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(60)));

        for _ in 0..2 {
            assert!(cb.should_allow());
            cb.record_failure(Duration::from_millis(1));
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
        assert_eq!(cb.snapshot().rejected_calls, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(60)));

        cb.record_failure(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        cb.record_success(Duration::ZERO);
        cb.record_failure(Duration::ZERO);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_recovers_through_half_open() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(10)));
        cb.force_open();
        assert!(!cb.should_allow());

        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::ZERO);
        assert!(cb.should_allow());
        cb.record_success(Duration::ZERO);

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(10)));
        cb.force_open();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.should_allow());
        cb.record_failure(Duration::ZERO);

        assert_eq!(cb.state(), CircuitState::Open);
    }
}
