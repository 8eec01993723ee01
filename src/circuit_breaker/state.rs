//! Failure accounting and state derivation for a single breaker.
//!
//! The state is never stored as a decision input. It is recomputed from
//! `(fail_count, fail_threshold, last_failure, health_check_period, now)`
//! every time it is needed:
//!
//! ```text
//! fail_count <  threshold                         -> Closed
//! fail_count >= threshold, now - last <= period   -> Open
//! fail_count >= threshold, now - last >  period   -> HalfOpen
//! ```
//!
//! A success clears the history (HalfOpen -> Closed); a failure bumps the
//! count and restarts the cool-down clock (HalfOpen -> Open).

use super::types::{CircuitBreakerConfig, CircuitState};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct FailureStamp {
    /// Monotonic instant used for the cool-down arithmetic
    at: Instant,
    /// Wall-clock time reported to observers
    wall: DateTime<Utc>,
}

/// Failure history of one breaker
#[derive(Debug)]
pub struct BreakerState {
    fail_count: u32,
    /// `None` exactly when `fail_count == 0`
    last_failure: Option<FailureStamp>,
    /// Last state reported to observers, only used to detect transitions
    observed: CircuitState,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerState {
    pub fn new() -> Self {
        Self {
            fail_count: 0,
            last_failure: None,
            observed: CircuitState::Closed,
        }
    }

    /// Derive the current state at `now`
    pub fn compute(&self, now: Instant, config: &CircuitBreakerConfig) -> CircuitState {
        if self.fail_count < config.fail_threshold {
            return CircuitState::Closed;
        }

        match self.last_failure {
            Some(stamp) if now.saturating_duration_since(stamp.at) <= config.health_check_period() => {
                CircuitState::Open
            }
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }

    /// Clear the failure history after a successful call
    pub fn record_success(&mut self) {
        self.fail_count = 0;
        self.last_failure = None;
    }

    /// Count a failure observed at `now`
    pub fn record_failure(&mut self, now: Instant) {
        self.last_failure = Some(FailureStamp {
            at: now,
            wall: Utc::now(),
        });
        self.fail_count = self.fail_count.saturating_add(1);
    }

    /// Remember `state` as the last one reported, returning the transition if it changed
    pub fn observe(&mut self, state: CircuitState) -> Option<(CircuitState, CircuitState)> {
        if self.observed == state {
            return None;
        }
        let from = std::mem::replace(&mut self.observed, state);
        Some((from, state))
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure.map(|stamp| stamp.wall)
    }

    pub(crate) fn last_failure_instant(&self) -> Option<Instant> {
        self.last_failure.map(|stamp| stamp.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(threshold: u32, period_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            fail_threshold: threshold,
            health_check_period_ms: period_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_state_is_closed_with_no_history() {
        let state = BreakerState::new();
        assert_eq!(state.compute(Instant::now(), &config(3, 1000)), CircuitState::Closed);
        assert_eq!(state.fail_count(), 0);
        assert!(state.last_failure_at().is_none());
    }

    #[test]
    fn test_below_threshold_is_closed_regardless_of_last_failure() {
        let cfg = config(3, 1000);
        let mut state = BreakerState::new();
        let start = Instant::now();
        state.record_failure(start);
        state.record_failure(start);

        for offset_ms in [0, 500, 1000, 5000] {
            let now = start + Duration::from_millis(offset_ms);
            assert_eq!(state.compute(now, &cfg), CircuitState::Closed);
        }
    }

    #[test]
    fn test_at_threshold_within_period_is_open() {
        let cfg = config(2, 1000);
        let mut state = BreakerState::new();
        let start = Instant::now();
        state.record_failure(start);
        state.record_failure(start);

        assert_eq!(state.compute(start, &cfg), CircuitState::Open);
        // The boundary itself still counts as the cool-down window
        assert_eq!(
            state.compute(start + Duration::from_millis(1000), &cfg),
            CircuitState::Open
        );
    }

    #[test]
    fn test_at_threshold_after_period_is_half_open() {
        let cfg = config(2, 1000);
        let mut state = BreakerState::new();
        let start = Instant::now();
        state.record_failure(start);
        state.record_failure(start);

        assert_eq!(
            state.compute(start + Duration::from_millis(1001), &cfg),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn test_success_clears_history() {
        let cfg = config(1, 1000);
        let mut state = BreakerState::new();
        let start = Instant::now();
        state.record_failure(start);
        assert_eq!(state.compute(start, &cfg), CircuitState::Open);

        state.record_success();
        assert_eq!(state.fail_count(), 0);
        assert!(state.last_failure_at().is_none());
        assert!(state.last_failure_instant().is_none());
        assert_eq!(state.compute(start, &cfg), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_restarts_cool_down() {
        let cfg = config(2, 1000);
        let mut state = BreakerState::new();
        let start = Instant::now();
        state.record_failure(start);
        state.record_failure(start);

        let probe_time = start + Duration::from_millis(1500);
        assert_eq!(state.compute(probe_time, &cfg), CircuitState::HalfOpen);

        state.record_failure(probe_time);
        assert_eq!(state.fail_count(), 3);
        assert_eq!(state.compute(probe_time, &cfg), CircuitState::Open);
        assert_eq!(
            state.compute(probe_time + Duration::from_millis(1001), &cfg),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn test_observe_reports_only_changes() {
        let mut state = BreakerState::new();
        assert_eq!(state.observe(CircuitState::Closed), None);
        assert_eq!(
            state.observe(CircuitState::Open),
            Some((CircuitState::Closed, CircuitState::Open))
        );
        assert_eq!(state.observe(CircuitState::Open), None);
        assert_eq!(
            state.observe(CircuitState::HalfOpen),
            Some((CircuitState::Open, CircuitState::HalfOpen))
        );
    }
}
