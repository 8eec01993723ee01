pub mod analytics;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod fallback;
pub mod observability;
pub mod request;
pub mod transport;

pub use crate::analytics::{Analytics, AnalyticsReport, AnalyticsSink, CallRecord, MetricsSink};
pub use crate::circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerService, CircuitState,
};
pub use crate::config::BreakwaterConfig;
pub use crate::error::{BreakerError, Result};
pub use crate::events::{BreakerEvent, EventPublisher};
pub use crate::fallback::{Fallback, FallbackChain};
pub use crate::observability::init_tracing;
pub use crate::request::{OutboundRequest, Response, StatusAllowList};
pub use crate::transport::{ReqwestTransport, Transport};
