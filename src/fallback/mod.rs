//! Ordered fallback producers for calls the breaker refuses to attempt.
//!
//! A chain is a degradation ladder: a secondary service, then a local cache,
//! then a static default. Producers run strictly in order and the first
//! success wins; later producers are never invoked.

use crate::error::{BreakerError, Result};
use crate::request::Response;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use tracing::debug;

type Producer = Box<dyn FnOnce() -> BoxFuture<'static, Result<Response>> + Send>;

/// A zero-argument producer of a degraded response
pub struct Fallback {
    label: Option<String>,
    produce: Producer,
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback")
            .field("label", &self.label)
            .field("produce", &"<closure>")
            .finish()
    }
}

impl Fallback {
    /// Fallback backed by an async producer, e.g. a secondary service call
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self {
            label: None,
            produce: Box::new(move || f().boxed()),
        }
    }

    /// Fallback backed by a synchronous producer, e.g. a cache lookup
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Response> + Send + 'static,
    {
        Self::new(move || futures::future::ready(f()))
    }

    /// Fallback that always serves `response`
    pub fn value(response: Response) -> Self {
        Self::from_fn(move || Ok(response))
    }

    /// Name used in logs
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Ordered list of fallbacks, consumed by a single call
#[derive(Debug, Default)]
pub struct FallbackChain {
    fallbacks: Vec<Fallback>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fallback at the lowest priority
    pub fn then(mut self, fallback: Fallback) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn len(&self) -> usize {
        self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fallbacks.is_empty()
    }

    /// Run producers in order until one succeeds
    ///
    /// Errors from failed producers are dropped once a later one succeeds.
    /// When every producer fails the last error is returned unchanged; an
    /// empty chain yields `BreakerError::NoFallback`.
    pub async fn execute(self) -> Result<Response> {
        let mut last_error = None;

        for (position, fallback) in self.fallbacks.into_iter().enumerate() {
            let label = fallback.label.unwrap_or_else(|| format!("#{}", position));
            match (fallback.produce)().await {
                Ok(response) => {
                    debug!(fallback = %label, status = response.status, "Fallback served response");
                    return Ok(response);
                }
                Err(e) => {
                    debug!(fallback = %label, error = %e, "Fallback failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(BreakerError::NoFallback))
    }
}

impl From<Vec<Fallback>> for FallbackChain {
    fn from(fallbacks: Vec<Fallback>) -> Self {
        Self { fallbacks }
    }
}

impl From<Fallback> for FallbackChain {
    fn from(fallback: Fallback) -> Self {
        Self {
            fallbacks: vec![fallback],
        }
    }
}

impl FromIterator<Fallback> for FallbackChain {
    fn from_iter<I: IntoIterator<Item = Fallback>>(iter: I) -> Self {
        Self {
            fallbacks: iter.into_iter().collect(),
        }
    }
}
