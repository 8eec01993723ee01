use super::{AnalyticsSink, CallRecord};
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use tracing::debug;

/// Publishes call outcomes through the `metrics` facade
///
/// Works with whatever recorder the process installed; without one every
/// call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink;

impl MetricsSink {
    pub fn new() -> Self {
        Self::register_metrics();
        Self
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "breakwater_calls_total",
            "Total number of protected calls by outcome"
        );
        describe_histogram!(
            "breakwater_call_duration_seconds",
            "Protected call latencies in seconds"
        );
        describe_gauge!(
            "breakwater_fail_count",
            "Current failure count of the breaker"
        );
        describe_gauge!(
            "breakwater_state",
            "Breaker state (0 = closed, 1 = open, 2 = half-open)"
        );

        debug!("Breaker metrics registered with descriptions");
    }
}

/// Outcome label for a call record
fn outcome(record: &CallRecord) -> &'static str {
    match (record.request_attempted, record.fallback_invoked, record.failure.is_some()) {
        (true, _, false) => "success",
        (true, _, true) => "failure",
        (false, true, false) => "fallback",
        (false, _, _) => "fallback_exhausted",
    }
}

impl AnalyticsSink for MetricsSink {
    fn record(&self, record: &CallRecord) {
        let labels = [
            ("breaker", record.breaker.clone()),
            ("outcome", outcome(record).to_string()),
        ];
        counter!("breakwater_calls_total", &labels).increment(1);
        histogram!("breakwater_call_duration_seconds", &labels)
            .record(record.duration.as_secs_f64());

        let breaker = [("breaker", record.breaker.clone())];
        gauge!("breakwater_fail_count", &breaker).set(record.fail_count as f64);
        gauge!("breakwater_state", &breaker).set(record.state.as_gauge());
    }
}
