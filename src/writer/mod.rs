//! Transactional writer: domain changes and outbox messages in one commit.
//!
//! ```ignore
//! let writer = TransactionalWriter::new(store.clone()).with_notifier(relay.notifier());
//!
//! let mut order = Entity::with_id("order-1");
//! order.digest("OrderPlaced", &placed)?;
//!
//! writer
//!     .outbox(OutboxMessage::json("OrderPlaced", &placed)?)
//!     .commit(&mut order)?;
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::{Committable, Entity};
use crate::error::StoreError;
use crate::message::OutboxMessage;
use crate::relay::Notifier;
use crate::store::Store;

/// Writes entities and their outbox messages atomically and optionally wakes
/// the relay afterwards.
pub struct TransactionalWriter<S> {
    store: Arc<S>,
    notifier: Option<Notifier>,
}

impl<S> Clone for TransactionalWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S> TransactionalWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Wake a relay thread whenever a commit writes outbox messages.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: Store> TransactionalWriter<S> {
    pub fn get(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        self.store.get(id)
    }

    /// Commit entities along with the messages queued on them.
    ///
    /// Returns how many outbox messages were written. On error nothing is
    /// persisted and the messages stay queued on their entities.
    pub fn commit<C: Committable + ?Sized>(&self, committable: &mut C) -> Result<usize, StoreError> {
        let (entities, messages) = {
            let entities = committable.entities_mut();
            let messages = entities.iter().map(|e| e.queued_messages().len()).sum::<usize>();
            (entities.len(), messages)
        };

        if let Err(err) = self.store.commit(committable) {
            warn!(error = %err, entities, messages, "transactional commit rejected");
            return Err(err);
        }
        debug!(entities, messages, "transactional commit");

        if messages > 0 {
            if let Some(notifier) = &self.notifier {
                notifier.notify();
            }
        }
        Ok(messages)
    }

    /// Start a commit that carries `message` alongside the entities.
    pub fn outbox(&self, message: OutboxMessage) -> OutboxCommit<'_, S> {
        OutboxCommit {
            writer: self,
            messages: vec![message],
        }
    }
}

/// Builder returned by [`TransactionalWriter::outbox`].
///
/// The messages are attached to the first entity of the batch, so their
/// `aggregate_id` is that entity's id.
pub struct OutboxCommit<'a, S> {
    writer: &'a TransactionalWriter<S>,
    messages: Vec<OutboxMessage>,
}

impl<'a, S: Store> OutboxCommit<'a, S> {
    /// Add another message to the same commit.
    pub fn and(mut self, message: OutboxMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn commit<C: Committable + ?Sized>(self, committable: &mut C) -> Result<usize, StoreError> {
        {
            let mut entities = committable.entities_mut();
            let Some(owner) = entities.first_mut() else {
                let id = self.messages.first().map(|m| m.id).unwrap_or_default();
                return Err(StoreError::invalid_message(id, "no entity to attach the message to"));
            };
            for message in self.messages {
                owner.outbox(message);
            }
        }
        self.writer.commit(committable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, OutboxStore};

    #[test]
    fn outbox_commit_writes_both() {
        let store = Arc::new(InMemoryStore::new());
        let writer = TransactionalWriter::new(Arc::clone(&store));

        let mut order = Entity::with_id("order-1");
        order.digest("OrderPlaced", &"sku-1").unwrap();

        let written = writer
            .outbox(OutboxMessage::new("OrderPlaced", b"{}".to_vec()))
            .and(OutboxMessage::new("ReserveStock", b"{}".to_vec()).with_destination("inventory"))
            .commit(&mut order)
            .unwrap();

        assert_eq!(written, 2);
        assert!(writer.get("order-1").unwrap().is_some());
        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].destination.as_deref(), Some("inventory"));
    }

    #[test]
    fn outbox_commit_needs_an_entity() {
        let writer = TransactionalWriter::new(Arc::new(InMemoryStore::new()));
        let mut nothing: Vec<&mut Entity> = Vec::new();
        let err = writer
            .outbox(OutboxMessage::new("OrderPlaced", Vec::new()))
            .commit(&mut nothing)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidMessage { .. }));
    }

    #[test]
    fn failed_commit_keeps_messages_queued() {
        let store = Arc::new(InMemoryStore::new());
        let writer = TransactionalWriter::new(Arc::clone(&store));

        let mut order = Entity::with_id("order-1");
        order.digest("OrderPlaced", &"sku-1").unwrap();
        writer.commit(&mut order).unwrap();

        let mut stale = Entity::with_id("order-1");
        stale.digest("OrderPlaced", &"sku-2").unwrap();
        let err = writer
            .outbox(OutboxMessage::new("OrderPlaced", Vec::new()))
            .commit(&mut stale)
            .unwrap_err();

        assert!(matches!(err, StoreError::ConcurrentWrite { .. }));
        assert_eq!(stale.queued_messages().len(), 1);
        assert!(store.pending().unwrap().is_empty());
    }
}
