use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::event_record::EventRecord;
use crate::message::OutboxMessage;

/// Event-sourced domain state that the writer persists.
///
/// Outbox messages queued with [`Entity::outbox`] are written in the same
/// commit as the entity's events and are cleared only when that commit
/// succeeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    version: u64,
    #[serde(default)]
    committed_version: u64,
    events: Vec<EventRecord>,
    #[serde(skip, default)]
    queued: Vec<OutboxMessage>,
    timestamp: SystemTime,
}

impl Default for Entity {
    fn default() -> Self {
        Entity {
            id: String::new(),
            version: 0,
            committed_version: 0,
            events: Vec::new(),
            queued: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }
}

impl Entity {
    pub fn with_id(id: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            ..Entity::default()
        }
    }

    /// Rebuild an entity from its stored history.
    pub fn from_history(id: impl Into<String>, events: Vec<EventRecord>) -> Self {
        let version = events.len() as u64;
        Entity {
            id: id.into(),
            version,
            committed_version: version,
            events,
            queued: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version the store held when this entity was loaded or last committed.
    pub fn committed_version(&self) -> u64 {
        self.committed_version
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Events recorded since the last commit.
    pub fn uncommitted_events(&self) -> &[EventRecord] {
        let committed = usize::try_from(self.committed_version).unwrap_or(usize::MAX);
        self.events.get(committed..).unwrap_or_default()
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.version != self.committed_version || !self.queued.is_empty()
    }

    /// Record a domain event with a bitcode-serialized payload.
    pub fn digest<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        payload: &T,
    ) -> Result<&EventRecord, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        let sequence = self.version + 1;
        self.events.push(EventRecord::new(name, bytes, sequence));
        self.version = sequence;
        self.timestamp = SystemTime::now();
        Ok(&self.events[self.events.len() - 1])
    }

    /// Queue an outbox message to be written with the next commit.
    pub fn outbox(&mut self, message: OutboxMessage) {
        self.queued.push(message);
    }

    pub fn queued_messages(&self) -> &[OutboxMessage] {
        &self.queued
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed_version = self.version;
        self.queued.clear();
    }
}
