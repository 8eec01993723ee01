use crate::error::{BreakerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are served by fallbacks
    Open,
    /// Cool-down elapsed, the next call probes the dependency
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for gauges: 0 = Closed, 1 = Open, 2 = HalfOpen
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure count at or above which the circuit stops trusting the dependency
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// Cool-down after the last failure before a probe is allowed
    #[serde(default = "default_health_check_period_ms")]
    pub health_check_period_ms: u64,

    /// Concurrent probes allowed while half-open (0 = unlimited)
    #[serde(default = "default_max_half_open_probes")]
    pub max_half_open_probes: u32,

    /// Deadline for caller-supplied requests that carry no timeout of their own
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_fail_threshold() -> u32 {
    5
}

fn default_health_check_period_ms() -> u64 {
    15_000
}

fn default_max_half_open_probes() -> u32 {
    1
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_threshold: default_fail_threshold(),
            health_check_period_ms: default_health_check_period_ms(),
            max_half_open_probes: default_max_half_open_probes(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Whole milliseconds in `duration`, rounded up and saturating at `u64::MAX`
pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl CircuitBreakerConfig {
    /// Config with the two construction parameters set and defaults elsewhere
    pub fn new(fail_threshold: u32, health_check_period: Duration) -> Self {
        Self {
            fail_threshold,
            health_check_period_ms: duration_to_millis(health_check_period),
            ..Default::default()
        }
    }

    pub fn health_check_period(&self) -> Duration {
        Duration::from_millis(self.health_check_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Probe limit, `None` when half-open admits every caller
    pub fn probe_limit(&self) -> Option<u32> {
        (self.max_half_open_probes > 0).then_some(self.max_half_open_probes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fail_threshold == 0 {
            return Err(BreakerError::Config(
                "fail_threshold must be > 0".to_string(),
            ));
        }
        if self.health_check_period_ms == 0 {
            return Err(BreakerError::Config(
                "health_check_period_ms must be > 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(BreakerError::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub fail_count: u32,
    pub fail_threshold: u32,
    pub health_check_period_ms: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
}
