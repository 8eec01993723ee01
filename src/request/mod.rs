//! Outbound request and response values.
//!
//! Both are rebuilt per call and never outlive it. The request carries
//! everything the executor needs (target, method, body, headers, allow-list,
//! deadline); the response carries the status and body plus the headers
//! observers may want to log.

pub mod classifier;
pub mod executor;

pub use classifier::{OutcomeClassifier, PredicateClassifier, StatusAllowList};
pub use executor::RequestExecutor;

use crate::error::{BreakerError, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied backoff function: maps an elapsed duration to the next wait
pub type BackoffFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound request description
#[derive(Clone)]
pub struct OutboundRequest {
    url: String,
    method: Method,
    body: Option<Bytes>,
    headers: HeaderMap,
    allowed_status: Option<Vec<u16>>,
    timeout: Duration,
    classifier: Option<Arc<dyn OutcomeClassifier>>,
    backoff: Option<BackoffFn>,
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body_len", &self.body.as_ref().map(|b| b.len()))
            .field("headers", &self.headers)
            .field("allowed_status", &self.allowed_status)
            .field("timeout", &self.timeout)
            .field("classifier", &self.classifier)
            .field("backoff", &self.backoff.is_some())
            .finish()
    }
}

impl OutboundRequest {
    /// Create a request with no body, no headers and the default 30s deadline
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: HeaderMap::new(),
            allowed_status: None,
            timeout: DEFAULT_TIMEOUT,
            classifier: None,
            backoff: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Body sent as-is
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header, rejecting names or values HTTP cannot carry
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BreakerError::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BreakerError::InvalidRequest(format!("Invalid header value for '{}': {}", name, e)))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Restrict success to these status codes
    pub fn allowed_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.allowed_status = Some(statuses.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the status allow-list with a custom success policy
    pub fn classifier(mut self, classifier: Arc<dyn OutcomeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Attach a backoff function for the caller's own retry scheduling
    pub fn with_backoff<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) -> Duration + Send + Sync + 'static,
    {
        self.backoff = Some(Arc::new(f));
        self
    }

    /// Evaluate the attached backoff function, if any
    pub fn backoff(&self, elapsed: Duration) -> Option<Duration> {
        self.backoff.as_ref().map(|f| f(elapsed))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn allowed(&self) -> Option<&[u16]> {
        self.allowed_status.as_deref()
    }

    pub fn deadline(&self) -> Duration {
        self.timeout
    }

    /// Success policy for this request: the custom classifier or the allow-list
    pub fn outcome_classifier(&self) -> Arc<dyn OutcomeClassifier> {
        match &self.classifier {
            Some(classifier) => classifier.clone(),
            None => Arc::new(StatusAllowList::new(self.allowed_status.clone())),
        }
    }

    /// Check the inputs before the request reaches the breaker
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| BreakerError::InvalidRequest(format!("Invalid URL '{}': {}", self.url, e)))?;

        check_target(&parsed, self.timeout)
    }
}

/// Reject targets that are not http(s) and deadlines that are not positive
pub(crate) fn check_target(url: &url::Url, timeout: Duration) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BreakerError::InvalidRequest(format!(
            "URL must use http:// or https://: {}",
            url
        )));
    }

    if timeout.is_zero() {
        return Err(BreakerError::InvalidRequest(
            "Timeout must be a positive duration".to_string(),
        ));
    }

    Ok(())
}

/// Normalized response of an outbound call or a fallback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, lossy
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Parse the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = OutboundRequest::get("http://localhost:9090/ping");
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.url(), "http://localhost:9090/ping");
        assert!(req.body_bytes().is_none());
        assert!(req.header_map().is_empty());
        assert!(req.allowed().is_none());
        assert_eq!(req.deadline(), Duration::from_secs(30));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_builder() {
        let req = OutboundRequest::post("https://payments.internal/charge")
            .body(r#"{"amount":10}"#)
            .header("content-type", "application/json")
            .unwrap()
            .allowed_status(vec![200, 201])
            .timeout(Duration::from_secs(2));

        assert_eq!(req.body_bytes().unwrap().as_ref(), br#"{"amount":10}"#);
        assert_eq!(
            req.header_map().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(req.allowed(), Some(&[200u16, 201][..]));
        assert_eq!(req.deadline(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_header_is_construction_error() {
        let result = OutboundRequest::get("http://localhost").header("bad header", "x");
        assert!(matches!(result, Err(BreakerError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_rejects_malformed_inputs() {
        assert!(OutboundRequest::get("not a url").validate().is_err());
        assert!(OutboundRequest::get("ftp://files.local/x").validate().is_err());
        assert!(OutboundRequest::get("http://localhost")
            .timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_check_target() {
        let url = url::Url::parse("https://payments.internal/charge").unwrap();
        assert!(check_target(&url, Duration::from_millis(1)).is_ok());
        assert!(matches!(
            check_target(&url, Duration::ZERO),
            Err(BreakerError::InvalidRequest(_))
        ));

        let url = url::Url::parse("ws://payments.internal/stream").unwrap();
        assert!(check_target(&url, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_backoff_is_evaluated_only_on_demand() {
        let req = OutboundRequest::get("http://localhost")
            .with_backoff(|elapsed| Duration::from_secs(elapsed.as_secs() * 5));
        assert_eq!(
            req.backoff(Duration::from_secs(2)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(OutboundRequest::get("http://localhost").backoff(Duration::ZERO), None);
    }

    #[test]
    fn test_response_helpers() {
        let resp = Response::new(200, r#"{"message":"PING!"}"#);
        assert_eq!(resp.text(), r#"{"message":"PING!"}"#);

        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["message"], "PING!");

        let default = Response::default();
        assert_eq!(default.status, 0);
        assert!(default.body.is_empty());
    }
}
