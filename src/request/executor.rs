use super::classifier::OutcomeClassifier;
use super::{OutboundRequest, Response};
use crate::error::{BreakerError, Result};
use crate::transport::Transport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Performs exactly one outbound call under a deadline and classifies it
///
/// The executor never touches breaker state; it only reports what happened.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send `request` through the transport, bounded by its timeout
    pub async fn execute(&self, request: &OutboundRequest) -> Result<Response> {
        request.validate()?;

        let classifier = request.outcome_classifier();
        bounded(
            request.deadline(),
            self.transport.send(request),
            classifier.as_ref(),
        )
        .await
    }
}

/// Await `send` for at most `deadline`, then classify the response
///
/// Transport errors are returned as-is without reaching the classifier. A
/// response the classifier rejects becomes `BreakerError::Rejected` carrying
/// the body as detail.
pub async fn bounded<F>(
    deadline: Duration,
    send: F,
    classifier: &dyn OutcomeClassifier,
) -> Result<Response>
where
    F: Future<Output = Result<Response>>,
{
    let response = match tokio::time::timeout(deadline, send).await {
        Ok(result) => result?,
        Err(_) => {
            debug!(deadline = ?deadline, "Request abandoned at deadline");
            return Err(BreakerError::Timeout(deadline));
        }
    };

    classify(response, classifier)
}

/// Apply the success policy to a completed response
pub fn classify(response: Response, classifier: &dyn OutcomeClassifier) -> Result<Response> {
    if classifier.is_success(response.status) {
        Ok(response)
    } else {
        Err(BreakerError::Rejected {
            status: response.status,
            body: response.text().into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::StatusAllowList;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct StubTransport {
        status: u16,
        body: &'static str,
        delay: Duration,
        calls: AtomicU32,
    }

    impl StubTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, _request: &OutboundRequest) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Response::new(self.status, self.body))
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let executor = RequestExecutor::new(Arc::new(StubTransport::new(201, "created")));
        let resp = executor
            .execute(&OutboundRequest::post("http://svc.local/items"))
            .await
            .unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.text(), "created");
    }

    #[tokio::test]
    async fn test_rejected_status_carries_body() {
        let executor = RequestExecutor::new(Arc::new(StubTransport::new(404, "no such user")));
        let req = OutboundRequest::get("http://svc.local/users/7").allowed_status(vec![200]);

        match executor.execute(&req).await {
            Err(BreakerError::Rejected { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such user");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_slow_call() {
        let transport = StubTransport {
            delay: Duration::from_secs(10),
            ..StubTransport::new(200, "late")
        };
        let executor = RequestExecutor::new(Arc::new(transport));
        let req = OutboundRequest::get("http://svc.local/slow").timeout(Duration::from_millis(100));

        let err = executor.execute(&req).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_transport() {
        let transport = Arc::new(StubTransport::new(200, "ok"));
        let executor = RequestExecutor::new(transport.clone());

        let err = executor
            .execute(&OutboundRequest::get("::not-a-url::"))
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::InvalidRequest(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classify_without_allow_list() {
        let classifier = StatusAllowList::default();
        assert!(classify(Response::new(201, ""), &classifier).is_ok());
        assert_eq!(
            classify(Response::new(404, "missing"), &classifier)
                .unwrap_err()
                .status(),
            Some(404)
        );
    }
}
