use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::Event;
use crate::entity::payload_serde;
use crate::error::StoreError;

/// Identity of an outbox message.
///
/// Generated ids are UUID v7, so they sort by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(MessageId)
    }
}

/// Status of an outbox message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboxStatus {
    #[default]
    Pending,
    InFlight,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OutboxStatus::Published | OutboxStatus::Failed)
    }
}

/// Durable record of work to publish, written in the same commit as the
/// domain change that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: MessageId,
    pub aggregate_id: Option<String>,
    pub aggregate_version: u64,
    pub event_type: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    /// Point-to-point queue. `None` means fan-out publish.
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub status: OutboxStatus,
    pub created_at: SystemTime,
    pub attempts: u32,
    pub locked_by: Option<String>,
    pub locked_until: Option<SystemTime>,
    pub published_at: Option<SystemTime>,
    pub failed_at: Option<SystemTime>,
    pub last_error: Option<String>,
}

impl OutboxMessage {
    pub const CORRELATION_ID: &'static str = "correlation_id";
    pub const CAUSATION_ID: &'static str = "causation_id";

    /// Create a pending message with a raw payload.
    pub fn new(event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        OutboxMessage {
            id: MessageId::new(),
            aggregate_id: None,
            aggregate_version: 0,
            event_type: event_type.into(),
            payload,
            destination: None,
            metadata: HashMap::new(),
            status: OutboxStatus::Pending,
            created_at: SystemTime::now(),
            attempts: 0,
            locked_by: None,
            locked_until: None,
            published_at: None,
            failed_at: None,
            last_error: None,
        }
    }

    /// Create a message with a bitcode (compact binary) payload.
    pub fn encode<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, bitcode::Error> {
        Ok(Self::new(event_type, bitcode::serialize(payload)?))
    }

    /// Create a message with a JSON payload.
    pub fn json<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_vec(payload)?))
    }

    /// Use a caller-chosen id, e.g. one derived from a natural key.
    ///
    /// The store rejects a second message with the same id.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Route the message to a single queue instead of publishing it.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(self, id: impl Into<String>) -> Self {
        self.with_metadata(Self::CORRELATION_ID, id)
    }

    pub fn with_causation_id(self, id: impl Into<String>) -> Self {
        self.with_metadata(Self::CAUSATION_ID, id)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.meta(Self::CORRELATION_ID)
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.meta(Self::CAUSATION_ID)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == OutboxStatus::InFlight
    }

    pub fn is_published(&self) -> bool {
        self.status == OutboxStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutboxStatus::Failed
    }

    /// Whether the in-flight lease has run out at `now`.
    pub fn lease_expired(&self, now: SystemTime) -> bool {
        self.locked_until.map(|until| until <= now).unwrap_or(true)
    }

    /// Whether a relay may claim this message at `now`.
    pub fn is_claimable(&self, now: SystemTime) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::InFlight => self.lease_expired(now),
            OutboxStatus::Published | OutboxStatus::Failed => false,
        }
    }

    /// Whether `worker_id` currently owns the lease.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.is_in_flight() && self.locked_by.as_deref() == Some(worker_id)
    }

    pub fn claim(
        &mut self,
        worker_id: impl Into<String>,
        lease: Duration,
        now: SystemTime,
    ) -> Result<(), StoreError> {
        if !self.is_claimable(now) {
            return Err(self.invalid_transition("claim"));
        }
        self.status = OutboxStatus::InFlight;
        self.attempts = self.attempts.saturating_add(1);
        self.locked_by = Some(worker_id.into());
        self.locked_until = Some(now.checked_add(lease).unwrap_or(now));
        Ok(())
    }

    pub fn complete(&mut self, now: SystemTime) -> Result<(), StoreError> {
        if !self.is_in_flight() {
            return Err(self.invalid_transition("complete"));
        }
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        self.locked_by = None;
        self.locked_until = None;
        self.last_error = None;
        Ok(())
    }

    pub fn release(&mut self, error: &str) -> Result<(), StoreError> {
        if !self.is_in_flight() {
            return Err(self.invalid_transition("release"));
        }
        self.status = OutboxStatus::Pending;
        self.locked_by = None;
        self.locked_until = None;
        self.last_error = non_empty(error);
        Ok(())
    }

    pub fn fail(&mut self, error: &str, now: SystemTime) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition("fail"));
        }
        self.status = OutboxStatus::Failed;
        self.failed_at = Some(now);
        self.locked_by = None;
        self.locked_until = None;
        self.last_error = non_empty(error);
        Ok(())
    }

    /// Put a dead-lettered message back in line with a fresh attempt budget.
    pub fn requeue(&mut self) -> Result<(), StoreError> {
        if !self.is_failed() {
            return Err(self.invalid_transition("requeue"));
        }
        self.status = OutboxStatus::Pending;
        self.attempts = 0;
        self.failed_at = None;
        self.last_error = None;
        Ok(())
    }

    /// Build the broker event for this message.
    ///
    /// The event id is the message id so consumers can drop redeliveries.
    pub fn to_event(&self) -> Event {
        let mut event = Event::new(self.id.to_string(), &self.event_type, self.payload.clone());
        if let Some(aggregate_id) = &self.aggregate_id {
            event = event
                .with_metadata("aggregate_id", aggregate_id)
                .with_metadata("aggregate_version", self.aggregate_version.to_string());
        }
        let mut keys: Vec<&String> = self.metadata.keys().collect();
        keys.sort();
        for key in keys {
            event = event.with_metadata(key, &self.metadata[key]);
        }
        event
    }

    fn invalid_transition(&self, action: &'static str) -> StoreError {
        StoreError::InvalidTransition {
            id: self.id,
            from: self.status,
            action,
        }
    }
}

fn non_empty(error: &str) -> Option<String> {
    if error.is_empty() {
        None
    } else {
        Some(error.to_string())
    }
}
