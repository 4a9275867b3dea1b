//! Notification channel to the execution layer.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Event bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Nobody is listening; the event would be lost.
    #[error("No subscriber for topic {0}")]
    NoSubscribers(String),

    /// The payload could not be encoded.
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Fire-and-forget publication of session lifecycle events.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError>;
}

/// In-process bus on a tokio broadcast channel.
pub struct BroadcastBus {
    tx: broadcast::Sender<BusEvent>,
}

impl BroadcastBus {
    /// Create a new bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError> {
        let event = BusEvent {
            topic: topic.to_string(),
            payload,
        };
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers(topic.to_string()))
    }
}

/// Encode a payload and publish it.
pub fn publish_json<T: Serialize>(bus: &dyn EventBus, topic: &str, payload: &T) -> Result<(), BusError> {
    bus.publish(topic, serde_json::to_value(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_without_subscriber_fails() {
        let bus = BroadcastBus::new(8);
        let err = bus.publish("session.start", json!({})).unwrap_err();
        assert!(matches!(err, BusError::NoSubscribers(topic) if topic == "session.start"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = BroadcastBus::new(8);
        let mut rx = bus.subscribe();

        publish_json(&bus, "session.start", &json!({"sessionId": "s1"})).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "session.start");
        assert_eq!(event.payload["sessionId"], "s1");
    }
}
