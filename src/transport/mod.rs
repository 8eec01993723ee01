//! Transport boundary: sends one normalized request and returns the raw
//! response. Classification and deadlines live in the request executor, so
//! any implementation only has to move bytes.

use crate::error::{BreakerError, Result};
use crate::request::{OutboundRequest, Response};
use async_trait::async_trait;
use http::HeaderMap;
use std::time::Duration;
use tracing::debug;

/// Swappable transport used by the request executor
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send `request` and return whatever status and body came back
    async fn send(&self, request: &OutboundRequest) -> Result<Response>;
}

/// Transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

impl ReqwestTransport {
    /// Create a transport with a default client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BreakerError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Execute a request the caller already built
    pub async fn execute(&self, request: reqwest::Request) -> Result<Response> {
        let deadline = request.timeout().copied();
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| map_reqwest_error(e, deadline))?;

        into_response(response).await
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url())
            .timeout(request.deadline());

        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        for (name, value) in request.header_map().iter() {
            if !is_hop_by_hop_header(name.as_str()) {
                builder = builder.header(name, value);
            }
        }

        debug!(method = %request.method(), url = %request.url(), "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, Some(request.deadline())))?;

        into_response(response).await
    }
}

fn map_reqwest_error(e: reqwest::Error, deadline: Option<Duration>) -> BreakerError {
    if e.is_timeout() {
        BreakerError::Timeout(deadline.unwrap_or_default())
    } else if e.is_connect() {
        BreakerError::Transport(format!("Failed to connect: {}", e))
    } else if e.is_builder() {
        BreakerError::Transport(format!("Failed to build request: {}", e))
    } else {
        BreakerError::Transport(format!("Request failed: {}", e))
    }
}

async fn into_response(response: reqwest::Response) -> Result<Response> {
    let status = response.status().as_u16();

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers().iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| BreakerError::Transport(format!("Failed to read response body: {}", e)))?;

    Ok(Response {
        status,
        headers,
        body,
    })
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
