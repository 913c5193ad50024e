use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tracing::debug;

use super::{OutboxStore, StatusCounts, Store};
use crate::entity::{Committable, Entity, EventRecord};
use crate::error::StoreError;
use crate::message::{MessageId, OutboxMessage, OutboxStatus};

#[derive(Default)]
struct State {
    entities: HashMap<String, Vec<EventRecord>>,
    outbox: Vec<OutboxMessage>,
}

impl State {
    fn stored_version(&self, id: &str) -> u64 {
        self.entities.get(id).map_or(0, |events| events.len() as u64)
    }

    fn find_mut(&mut self, id: &MessageId) -> Result<&mut OutboxMessage, StoreError> {
        self.outbox
            .iter_mut()
            .find(|message| message.id == *id)
            .ok_or(StoreError::MessageNotFound(*id))
    }

    fn find_leased(
        &mut self,
        id: &MessageId,
        worker_id: &str,
    ) -> Result<&mut OutboxMessage, StoreError> {
        let message = self.find_mut(id)?;
        if !message.is_held_by(worker_id) {
            return Err(StoreError::LeaseLost {
                id: *id,
                worker_id: worker_id.to_string(),
            });
        }
        Ok(message)
    }
}

/// Store keeping entities and the outbox behind a single lock.
///
/// Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(state: &State, entities: &[&mut Entity]) -> Result<(), StoreError> {
        let mut entity_ids = HashSet::new();
        let mut message_ids = HashSet::new();

        for entity in entities {
            if !entity_ids.insert(entity.id()) {
                return Err(StoreError::DuplicateEntity(entity.id().to_string()));
            }

            let actual = state.stored_version(entity.id());
            if actual != entity.committed_version() {
                return Err(StoreError::ConcurrentWrite {
                    id: entity.id().to_string(),
                    expected: entity.committed_version(),
                    actual,
                });
            }

            for message in entity.queued_messages() {
                if message.event_type.trim().is_empty() {
                    return Err(StoreError::invalid_message(message.id, "event type is empty"));
                }
                if !message.is_pending() {
                    return Err(StoreError::invalid_message(
                        message.id,
                        format!("new messages must be pending, not {:?}", message.status),
                    ));
                }
                if !message_ids.insert(message.id)
                    || state.outbox.iter().any(|stored| stored.id == message.id)
                {
                    return Err(StoreError::DuplicateMessage(message.id));
                }
            }
        }

        Ok(())
    }
}

impl Store for InMemoryStore {
    fn get(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        Ok(state
            .entities
            .get(id)
            .map(|events| Entity::from_history(id, events.clone())))
    }

    fn commit<C: Committable + ?Sized>(&self, committable: &mut C) -> Result<(), StoreError> {
        let mut entities = committable.entities_mut();
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("commit"))?;

        Self::validate(&state, &entities)?;

        for entity in entities.iter_mut() {
            let id = entity.id().to_string();
            let version = entity.version();
            state.entities.insert(id.clone(), entity.events().to_vec());

            for queued in entity.queued_messages() {
                let mut message = queued.clone();
                message.aggregate_id = Some(id.clone());
                message.aggregate_version = version;
                debug!(message_id = %message.id, event_type = %message.event_type, aggregate_id = %id, "outbox message written");
                state.outbox.push(message);
            }

            entity.mark_committed();
        }

        Ok(())
    }
}

impl OutboxStore for InMemoryStore {
    fn message(&self, id: &MessageId) -> Result<Option<OutboxMessage>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(state.outbox.iter().find(|message| message.id == *id).cloned())
    }

    fn messages_by_status(&self, status: OutboxStatus) -> Result<Vec<OutboxMessage>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(state
            .outbox
            .iter()
            .filter(|message| message.status == status)
            .cloned()
            .collect())
    }

    fn counts(&self) -> Result<StatusCounts, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        let mut counts = StatusCounts::default();
        for message in &state.outbox {
            counts.add(message.status);
        }
        Ok(counts)
    }

    fn claim(
        &self,
        worker_id: &str,
        max: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox claim"))?;
        let now = SystemTime::now();
        let mut claimed = Vec::new();

        for message in state.outbox.iter_mut() {
            if claimed.len() >= max {
                break;
            }
            if !message.is_claimable(now) {
                continue;
            }
            message.claim(worker_id, lease, now)?;
            claimed.push(message.clone());
        }

        Ok(claimed)
    }

    fn complete(&self, id: &MessageId, worker_id: &str) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox complete"))?;
        state.find_leased(id, worker_id)?.complete(SystemTime::now())
    }

    fn release(&self, id: &MessageId, worker_id: &str, error: &str) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox release"))?;
        state.find_leased(id, worker_id)?.release(error)
    }

    fn fail(&self, id: &MessageId, worker_id: &str, error: &str) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox fail"))?;
        state.find_leased(id, worker_id)?.fail(error, SystemTime::now())
    }

    fn requeue(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox requeue"))?;
        state.find_mut(id)?.requeue()
    }

    fn purge_published(&self, older_than: Duration) -> Result<usize, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox purge"))?;
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let before = state.outbox.len();
        state.outbox.retain(|message| {
            !(message.is_published()
                && message.published_at.is_some_and(|at| at <= cutoff))
        });
        Ok(before - state.outbox.len())
    }
}
