//! Outcome reporting. Sinks observe every orchestrated call and own all rate
//! computation; nothing here feeds back into breaker state.

pub mod metrics;

pub use self::metrics::MetricsSink;

use crate::circuit_breaker::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// What happened during one orchestrated call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Breaker name
    pub breaker: String,
    /// State the call was decided in
    pub state: CircuitState,
    /// Whether the real request was attempted
    pub request_attempted: bool,
    /// Whether the fallback chain was run
    pub fallback_invoked: bool,
    /// Error of the attempted request or of the exhausted fallback chain
    pub failure: Option<String>,
    /// Breaker failure count after bookkeeping
    pub fail_count: u32,
    /// Wall time spent in the call
    pub duration: Duration,
}

impl CallRecord {
    /// The real request was attempted and failed
    pub fn request_failed(&self) -> bool {
        self.request_attempted && self.failure.is_some()
    }
}

/// Receiver of call outcomes
pub trait AnalyticsSink: Send + Sync + std::fmt::Debug {
    fn record(&self, record: &CallRecord);
}

/// A single recorded request failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// Running total of failures when this one was recorded
    pub total_failures: u64,
}

/// Aggregated view produced by [`Analytics`]
///
/// Rates are percentages of `request_sent`, or 0.0 before any request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub request_sent: u64,
    pub total_failures: u64,
    pub fallback_calls: u64,
    pub total_calls: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Default)]
struct Counters {
    request_sent: u64,
    total_failures: u64,
    fallback_calls: u64,
    total_calls: u64,
    failures: VecDeque<FailureRecord>,
}

const DEFAULT_MAX_FAILURES: usize = 100;

/// In-memory aggregator keeping counters and the most recent failures
#[derive(Debug)]
pub struct Analytics {
    counters: Mutex<Counters>,
    max_failures: usize,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    pub fn new() -> Self {
        Self::with_max_failures(DEFAULT_MAX_FAILURES)
    }

    /// Keep at most `max_failures` failure records
    pub fn with_max_failures(max_failures: usize) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            max_failures,
        }
    }

    /// Current totals and rates
    pub fn report(&self) -> AnalyticsReport {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());

        let (success_rate, failure_rate) = if counters.request_sent == 0 {
            (0.0, 0.0)
        } else {
            let sent = counters.request_sent as f64;
            let failed = counters.total_failures as f64;
            ((sent - failed) / sent * 100.0, failed / sent * 100.0)
        };

        AnalyticsReport {
            request_sent: counters.request_sent,
            total_failures: counters.total_failures,
            fallback_calls: counters.fallback_calls,
            total_calls: counters.total_calls,
            success_rate,
            failure_rate,
            failures: counters.failures.iter().cloned().collect(),
        }
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters = Counters::default();
    }
}

impl AnalyticsSink for Analytics {
    fn record(&self, record: &CallRecord) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.total_calls += 1;

        if record.fallback_invoked {
            counters.fallback_calls += 1;
        }

        if !record.request_attempted {
            return;
        }
        counters.request_sent += 1;

        if let Some(message) = &record.failure {
            counters.total_failures += 1;
            let entry = FailureRecord {
                message: message.clone(),
                occurred_at: Utc::now(),
                total_failures: counters.total_failures,
            };
            counters.failures.push_back(entry);
            while counters.failures.len() > self.max_failures {
                counters.failures.pop_front();
            }
        }
    }
}
