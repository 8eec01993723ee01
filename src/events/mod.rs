//! Fire-and-forget breaker notifications.
//!
//! Events are pushed into a bounded `tokio::sync::mpsc` queue owned by the
//! caller. Publishing never blocks or awaits: when the queue is full or the
//! receiver is gone the event is dropped and logged at debug level.
//! Delivery is therefore best-effort.

use crate::circuit_breaker::CircuitState;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Notification emitted by a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BreakerEvent {
    /// The derived state differs from the last one observed
    StateChanged {
        breaker: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// A failed call was counted
    FailureRecorded { breaker: String, fail_count: u32 },
}

impl BreakerEvent {
    pub fn breaker(&self) -> &str {
        match self {
            BreakerEvent::StateChanged { breaker, .. } => breaker,
            BreakerEvent::FailureRecorded { breaker, .. } => breaker,
        }
    }
}

/// Non-blocking publisher over a caller-supplied bounded queue
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    sender: Option<mpsc::Sender<BreakerEvent>>,
}

impl EventPublisher {
    /// Publisher that discards every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn new(sender: mpsc::Sender<BreakerEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Create a queue of `capacity` events; zero capacity means no queue
    pub fn channel(capacity: usize) -> (Self, Option<mpsc::Receiver<BreakerEvent>>) {
        if capacity == 0 {
            return (Self::disabled(), None);
        }
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), Some(rx))
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Try to enqueue `event`, dropping it if the queue cannot take it now
    pub fn publish(&self, event: BreakerEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(?event, "Event queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(?event, "Event receiver closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(count: u32) -> BreakerEvent {
        BreakerEvent::FailureRecorded {
            breaker: "payments".to_string(),
            fail_count: count,
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let (publisher, rx) = EventPublisher::channel(4);
        let mut rx = rx.unwrap();

        publisher.publish(failure(1));
        publisher.publish(BreakerEvent::StateChanged {
            breaker: "payments".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        });

        assert_eq!(rx.recv().await.unwrap(), failure(1));
        match rx.recv().await.unwrap() {
            BreakerEvent::StateChanged { from, to, .. } => {
                assert_eq!(from, CircuitState::Closed);
                assert_eq!(to, CircuitState::Open);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (publisher, rx) = EventPublisher::channel(1);
        let mut rx = rx.unwrap();

        publisher.publish(failure(1));
        publisher.publish(failure(2));
        publisher.publish(failure(3));

        assert_eq!(rx.recv().await.unwrap(), failure(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_disabled() {
        let (publisher, rx) = EventPublisher::channel(0);
        assert!(!publisher.is_enabled());
        assert!(rx.is_none());
        // No-op, must not panic
        publisher.publish(failure(1));
    }

    #[test]
    fn test_closed_receiver_is_tolerated() {
        let (publisher, rx) = EventPublisher::channel(2);
        drop(rx);
        publisher.publish(failure(1));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(failure(2)).unwrap();
        assert_eq!(json["event"], "failure_recorded");
        assert_eq!(json["fail_count"], 2);
        assert_eq!(failure(2).breaker(), "payments");
    }
}
