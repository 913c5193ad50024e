//! Core publisher traits for the broker side of the relay.

use thiserror::Error;

/// An event handed to the broker.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Unique identifier; for relayed messages this is the outbox message id
    pub id: String,
    /// Event type (e.g., "OrderPlaced", "PaymentCaptured")
    pub event_type: String,
    /// Serialized payload (typically JSON or bitcode)
    pub payload: Vec<u8>,
    /// Headers such as correlation ids
    pub metadata: Vec<(String, String)>,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            metadata: Vec::new(),
        }
    }

    pub fn with_string_payload(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, event_type, payload.into().into_bytes())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// First metadata value stored under `key`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("event rejected: {0}")]
    Rejected(String),
    #[error("publish timeout")]
    Timeout,
    #[error("{0} is not supported by this publisher")]
    Unsupported(&'static str),
    #[error("publish error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Trait for delivering events to a message broker.
///
/// Implementations might include:
/// - `InMemoryQueue` - For testing and single-process scenarios
/// - `LogPublisher` - Writes events to the tracing log
/// - Kafka, NATS or RabbitMQ adapters living in the host application
pub trait Publisher: Send + Sync {
    /// Publish a single event (fan-out).
    fn publish(&self, event: Event) -> Result<(), PublishError>;

    /// Publish multiple events, stopping at the first error.
    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }

    /// Deliver an event to a single named queue (point-to-point).
    fn send(&self, destination: &str, event: Event) -> Result<(), PublishError> {
        let _ = (destination, event);
        Err(PublishError::Unsupported("point-to-point send"))
    }
}

impl<P: Publisher + ?Sized> Publisher for std::sync::Arc<P> {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        (**self).publish(event)
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        (**self).publish_batch(events)
    }

    fn send(&self, destination: &str, event: Event) -> Result<(), PublishError> {
        (**self).send(destination, event)
    }
}

/// Pull-based consumer side of a broker.
pub trait Subscriber: Send + Sync {
    /// Poll for the next event, waiting up to `timeout_ms`.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError>;

    /// Acknowledge that an event has been processed.
    fn ack(&self, event_id: &str) -> Result<(), PublishError>;

    /// Reject an event so it is redelivered.
    fn nack(&self, event_id: &str, reason: &str) -> Result<(), PublishError>;
}
