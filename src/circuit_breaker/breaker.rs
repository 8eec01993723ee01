use super::state::BreakerState;
use super::types::{duration_to_millis, BreakerSnapshot, CircuitBreakerConfig, CircuitState};
use crate::analytics::{AnalyticsSink, CallRecord};
use crate::error::{BreakerError, Result};
use crate::events::{BreakerEvent, EventPublisher};
use crate::fallback::FallbackChain;
use crate::request::executor::bounded;
use crate::request::{check_target, OutboundRequest, RequestExecutor, Response, StatusAllowList};
use crate::transport::{ReqwestTransport, Transport};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Circuit breaker protecting a single dependency
///
/// Clones share the same failure history, probe permits, event queue and
/// analytics sinks.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Dependency identifier
    name: String,
    /// Immutable for the breaker's lifetime
    config: CircuitBreakerConfig,
    state: Arc<RwLock<BreakerState>>,
    /// HalfOpen probes currently in flight
    probes: Arc<AtomicU32>,
    executor: RequestExecutor,
    /// Client used for caller-built requests
    http: ReqwestTransport,
    events: EventPublisher,
    analytics: Vec<Arc<dyn AnalyticsSink>>,
}

/// Builder for [`CircuitBreaker`]
#[derive(Debug, Default)]
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    transport: Option<Arc<dyn Transport>>,
    http: Option<ReqwestTransport>,
    events: EventPublisher,
    analytics: Vec<Arc<dyn AnalyticsSink>>,
}

impl CircuitBreakerBuilder {
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fail_threshold(mut self, threshold: u32) -> Self {
        self.config.fail_threshold = threshold;
        self
    }

    /// Cool-down after the last failure, rounded up to whole milliseconds
    pub fn health_check_period(mut self, period: Duration) -> Self {
        self.config.health_check_period_ms = duration_to_millis(period);
        self
    }

    /// Concurrent HalfOpen probes allowed; 0 lifts the limit
    pub fn max_half_open_probes(mut self, probes: u32) -> Self {
        self.config.max_half_open_probes = probes;
        self
    }

    /// Default deadline for caller-built requests, rounded up to whole milliseconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Transport used by [`CircuitBreaker::call`]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Client used by [`CircuitBreaker::call_with_request`], and by `call`
    /// when no other transport is set
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(ReqwestTransport::with_client(client));
        self
    }

    pub fn events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// Publish events into a caller-owned queue
    pub fn event_sender(self, sender: mpsc::Sender<BreakerEvent>) -> Self {
        self.events(EventPublisher::new(sender))
    }

    /// Add an analytics sink; any number may be attached
    pub fn analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics.push(sink);
        self
    }

    pub fn build(self) -> Result<CircuitBreaker> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => ReqwestTransport::new()?,
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(http.clone()) as Arc<dyn Transport>);

        info!(
            breaker = %self.name,
            fail_threshold = self.config.fail_threshold,
            health_check_period_ms = self.config.health_check_period_ms,
            max_half_open_probes = self.config.max_half_open_probes,
            "Creating circuit breaker"
        );

        Ok(CircuitBreaker {
            name: self.name,
            config: self.config,
            state: Arc::new(RwLock::new(BreakerState::new())),
            probes: Arc::new(AtomicU32::new(0)),
            executor: RequestExecutor::new(transport),
            http,
            events: self.events,
            analytics: self.analytics,
        })
    }
}

/// Decision taken at the start of a call
enum Admission {
    Attempt {
        state: CircuitState,
        permit: Option<ProbePermit>,
    },
    ShortCircuit {
        state: CircuitState,
    },
}

/// Releases a HalfOpen probe slot when dropped
struct ProbePermit {
    probes: Arc<AtomicU32>,
}

impl Drop for ProbePermit {
    fn drop(&mut self) {
        self.probes.fetch_sub(1, Ordering::AcqRel);
    }
}

impl CircuitBreaker {
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a breaker with the default reqwest transport and no observers
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self> {
        Self::builder(name).config(config).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Protected call of a request built by the breaker's transport
    ///
    /// Malformed requests are rejected before the breaker is consulted.
    pub async fn call(
        &self,
        request: &OutboundRequest,
        fallbacks: impl Into<FallbackChain>,
    ) -> Result<Response> {
        request.validate()?;
        self.run(|| self.executor.execute(request), fallbacks).await
    }

    /// Protected call of a caller-built `reqwest::Request`
    ///
    /// The request's own timeout bounds the call when set, otherwise the
    /// breaker's `request_timeout`.
    pub async fn call_with_request(
        &self,
        request: reqwest::Request,
        allowed_status: Option<Vec<u16>>,
        fallbacks: impl Into<FallbackChain>,
    ) -> Result<Response> {
        let deadline = request
            .timeout()
            .copied()
            .unwrap_or_else(|| self.config.request_timeout());
        check_target(request.url(), deadline)?;
        let classifier = StatusAllowList::new(allowed_status);

        self.run(
            || async move { bounded(deadline, self.http.execute(request), &classifier).await },
            fallbacks,
        )
        .await
    }

    /// Run one protected call
    ///
    /// In Closed or HalfOpen, `attempt` is awaited and its outcome is fed
    /// back into the failure history; a failure is returned to the caller
    /// and the fallbacks are not consulted. In Open, `attempt` is never
    /// invoked and the fallback chain produces the result without touching
    /// breaker state.
    pub async fn run<F, Fut>(&self, attempt: F, fallbacks: impl Into<FallbackChain>) -> Result<Response>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let span = info_span!("breaker_call", breaker = %self.name, call_id = %Uuid::new_v4());
        self.run_inner(attempt, fallbacks.into()).instrument(span).await
    }

    async fn run_inner<F, Fut>(&self, attempt: F, fallbacks: FallbackChain) -> Result<Response>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let started = Instant::now();

        match self.admit().await {
            Admission::Attempt { state, permit } => {
                debug!(state = %state, "Attempting request");

                let result = attempt().await;
                let fail_count = match &result {
                    Ok(_) => self.on_success().await,
                    Err(e) => self.on_failure(e).await,
                };
                drop(permit);

                self.record(CallRecord {
                    breaker: self.name.clone(),
                    state,
                    request_attempted: true,
                    fallback_invoked: false,
                    failure: result.as_ref().err().map(ToString::to_string),
                    fail_count,
                    duration: started.elapsed(),
                });
                result
            }
            Admission::ShortCircuit { state } => {
                debug!(fallbacks = fallbacks.len(), "Circuit open, serving fallback");

                let result = fallbacks.execute().await;
                if let Err(e) = &result {
                    warn!(breaker = %self.name, error = %e, "Fallback chain exhausted");
                }

                let fail_count = self.state.read().await.fail_count();
                self.record(CallRecord {
                    breaker: self.name.clone(),
                    state,
                    request_attempted: false,
                    fallback_invoked: true,
                    failure: result.as_ref().err().map(ToString::to_string),
                    fail_count,
                    duration: started.elapsed(),
                });
                result
            }
        }
    }

    /// Compute the state and decide whether this call may attempt the request
    async fn admit(&self) -> Admission {
        let mut state = self.state.write().await;
        let current = state.compute(Instant::now(), &self.config);
        self.observe(&mut state, current);

        match current {
            CircuitState::Closed => Admission::Attempt {
                state: current,
                permit: None,
            },
            CircuitState::Open => Admission::ShortCircuit { state: current },
            CircuitState::HalfOpen => match self.try_acquire_probe() {
                Ok(permit) => Admission::Attempt {
                    state: current,
                    permit,
                },
                Err(in_flight) => {
                    debug!(
                        breaker = %self.name,
                        in_flight,
                        "Probe already in flight, treating call as open"
                    );
                    Admission::ShortCircuit {
                        state: CircuitState::Open,
                    }
                }
            },
        }
    }

    /// Take a probe slot, or return the number of probes in flight when full
    fn try_acquire_probe(&self) -> std::result::Result<Option<ProbePermit>, u32> {
        let Some(limit) = self.config.probe_limit() else {
            return Ok(None);
        };

        self.probes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| {
                Some(ProbePermit {
                    probes: self.probes.clone(),
                })
            })
    }

    async fn on_success(&self) -> u32 {
        let mut state = self.state.write().await;
        state.record_success();

        let current = state.compute(Instant::now(), &self.config);
        self.observe(&mut state, current);
        state.fail_count()
    }

    async fn on_failure(&self, error: &BreakerError) -> u32 {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.record_failure(now);
        let fail_count = state.fail_count();

        warn!(
            breaker = %self.name,
            fail_count,
            threshold = self.config.fail_threshold,
            error = %error,
            "Request failed"
        );
        self.events.publish(BreakerEvent::FailureRecorded {
            breaker: self.name.clone(),
            fail_count,
        });

        let current = state.compute(now, &self.config);
        self.observe(&mut state, current);
        fail_count
    }

    /// Publish a transition if `current` differs from the last observed state
    fn observe(&self, state: &mut BreakerState, current: CircuitState) {
        let Some((from, to)) = state.observe(current) else {
            return;
        };

        info!(
            breaker = %self.name,
            from = %from,
            to = %to,
            fail_count = state.fail_count(),
            "Circuit breaker state changed"
        );
        self.events.publish(BreakerEvent::StateChanged {
            breaker: self.name.clone(),
            from,
            to,
        });
    }

    fn record(&self, record: CallRecord) {
        for sink in &self.analytics {
            sink.record(&record);
        }
    }

    /// Current state, computed now
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.compute(Instant::now(), &self.config)
    }

    pub async fn fail_count(&self) -> u32 {
        self.state.read().await.fail_count()
    }

    /// Wall-clock time of the most recent counted failure
    pub async fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_failure_at()
    }

    /// Time left before an Open breaker lets a probe through
    pub async fn remaining_cooldown(&self) -> Option<Duration> {
        let state = self.state.read().await;
        let now = Instant::now();
        if state.compute(now, &self.config) != CircuitState::Open {
            return None;
        }
        let last = state.last_failure_instant()?;
        Some(
            self.config
                .health_check_period()
                .saturating_sub(now.saturating_duration_since(last)),
        )
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.read().await;
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.compute(Instant::now(), &self.config),
            fail_count: state.fail_count(),
            fail_threshold: self.config.fail_threshold,
            health_check_period_ms: self.config.health_check_period_ms,
            last_failure_at: state.last_failure_at(),
        }
    }

    /// Forget the failure history and return to Closed
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.record_success();
        info!(breaker = %self.name, "Circuit breaker reset");
        self.observe(&mut state, CircuitState::Closed);
    }
}
