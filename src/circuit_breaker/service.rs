use super::breaker::CircuitBreaker;
use super::types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
use crate::analytics::AnalyticsSink;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::fallback::FallbackChain;
use crate::request::{OutboundRequest, Response};
use crate::transport::{ReqwestTransport, Transport};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of circuit breakers, one per named dependency
///
/// Breakers are created on first use and share the registry's config,
/// transport, event queue and analytics sinks.
#[derive(Debug, Clone)]
pub struct CircuitBreakerService {
    /// Circuit breakers per dependency
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    /// Default configuration
    config: CircuitBreakerConfig,
    transport: Arc<dyn Transport>,
    http: ReqwestTransport,
    events: EventPublisher,
    analytics: Vec<Arc<dyn AnalyticsSink>>,
}

impl CircuitBreakerService {
    /// Create a new circuit breaker service
    pub fn new(config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;
        let http = ReqwestTransport::new()?;
        Ok(Self {
            breakers: Arc::new(DashMap::new()),
            config,
            transport: Arc::new(http.clone()),
            http,
            events: EventPublisher::disabled(),
            analytics: Vec::new(),
        })
    }

    /// Use `transport` for every breaker created from now on
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics.push(sink);
        self
    }

    /// Get or create the breaker for `name`
    pub fn get_or_create(&self, name: &str) -> Result<Arc<CircuitBreaker>> {
        if let Some(breaker) = self.breakers.get(name) {
            return Ok(breaker.clone());
        }

        let entry = self.breakers.entry(name.to_string());
        if let dashmap::mapref::entry::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        debug!(breaker = name, "Creating new circuit breaker");
        let mut builder = CircuitBreaker::builder(name)
            .config(self.config.clone())
            .transport(self.transport.clone())
            .http_client(self.http.client().clone())
            .events(self.events.clone());
        for sink in &self.analytics {
            builder = builder.analytics(sink.clone());
        }
        let breaker = Arc::new(builder.build()?);

        Ok(entry.or_insert(breaker).clone())
    }

    /// Protected call through the breaker for `name`
    pub async fn call(
        &self,
        name: &str,
        request: &OutboundRequest,
        fallbacks: impl Into<FallbackChain>,
    ) -> Result<Response> {
        let breaker = self.get_or_create(name)?;
        breaker.call(request, fallbacks).await
    }

    /// Get the state of the breaker for `name`; unknown names are Closed
    pub async fn state(&self, name: &str) -> CircuitState {
        match self.get(name) {
            Some(breaker) => breaker.state().await,
            None => CircuitState::Closed,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    pub async fn snapshot(&self, name: &str) -> Option<BreakerSnapshot> {
        match self.get(name) {
            Some(breaker) => Some(breaker.snapshot().await),
            None => None,
        }
    }

    /// Get all dependency names with circuit breakers
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshots of every breaker, sorted by name
    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        // Collect first so no map guard is held across an await
        let breakers: Vec<_> = self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut results = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            results.push(breaker.snapshot().await);
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }
}
