use std::time::Duration;

use tracing::{debug, error, warn};

use crate::bus::Publisher;
use crate::config::{default_worker_id, RelayConfig};
use crate::error::StoreError;
use crate::message::OutboxMessage;
use crate::store::OutboxStore;

/// Result of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub completed: usize,
    pub released: usize,
    pub failed: usize,
    /// Delivered or failed, but another relay took the lease first.
    pub lost: usize,
}

/// What happened to a single claimed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Completed,
    Released,
    Failed,
    Lost,
}

/// Moves claimed outbox messages to a [`Publisher`].
///
/// Messages are claimed oldest first and delivered one at a time. A message
/// with a destination goes through `Publisher::send`, everything else through
/// `Publisher::publish`. A failed delivery is released for the next poll
/// until `max_attempts` is reached, then the message is dead-lettered.
pub struct OutboxRelay<P> {
    publisher: P,
    worker_id: String,
    batch_size: usize,
    lease: Duration,
    max_attempts: u32,
    retention: Option<Duration>,
}

impl<P> OutboxRelay<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            worker_id: default_worker_id(),
            batch_size: 100,
            lease: Duration::from_secs(60),
            max_attempts: 5,
            retention: None,
        }
    }

    pub fn from_config(config: &RelayConfig, publisher: P) -> Self {
        Self {
            publisher,
            worker_id: config.worker_id.clone(),
            batch_size: config.batch_size.max(1),
            lease: config.lease(),
            max_attempts: config.max_attempts,
            retention: config.retention(),
        }
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Maximum messages claimed per drain pass. At least one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// How long a claim stays exclusive before another relay may take it.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Purge published messages older than `retention` between polls.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<P: Publisher> OutboxRelay<P> {
    /// Claim one batch and deliver it.
    ///
    /// Store failures other than a lost lease abort the pass; messages still
    /// leased become claimable again once their lease expires.
    pub fn drain<S: OutboxStore + ?Sized>(&self, store: &S) -> Result<DrainResult, StoreError> {
        let messages = store.claim(&self.worker_id, self.batch_size, self.lease)?;
        let mut result = DrainResult {
            claimed: messages.len(),
            ..DrainResult::default()
        };

        for message in &messages {
            match self.deliver(store, message)? {
                Delivery::Completed => result.completed += 1,
                Delivery::Released => result.released += 1,
                Delivery::Failed => result.failed += 1,
                Delivery::Lost => result.lost += 1,
            }
        }

        Ok(result)
    }

    /// Deliver one message this relay has already claimed.
    pub fn deliver<S: OutboxStore + ?Sized>(
        &self,
        store: &S,
        message: &OutboxMessage,
    ) -> Result<Delivery, StoreError> {
        let event = message.to_event();
        let outcome = match &message.destination {
            Some(destination) => self.publisher.send(destination, event),
            None => self.publisher.publish(event),
        };

        let settled = match outcome {
            Ok(()) => store
                .complete(&message.id, &self.worker_id)
                .map(|()| Delivery::Completed),
            Err(err) if message.attempts >= self.max_attempts => {
                error!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    attempts = message.attempts,
                    error = %err,
                    "outbox message dead-lettered"
                );
                store
                    .fail(&message.id, &self.worker_id, &err.to_string())
                    .map(|()| Delivery::Failed)
            }
            Err(err) => {
                warn!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    attempts = message.attempts,
                    error = %err,
                    "outbox delivery failed, releasing for retry"
                );
                store
                    .release(&message.id, &self.worker_id, &err.to_string())
                    .map(|()| Delivery::Released)
            }
        };

        match settled {
            Ok(delivery) => {
                debug!(message_id = %message.id, event_type = %message.event_type, ?delivery, "outbox message settled");
                Ok(delivery)
            }
            Err(StoreError::LeaseLost { id, worker_id }) => {
                warn!(message_id = %id, %worker_id, "outbox lease lost before settling, message may be delivered twice");
                Ok(Delivery::Lost)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::{Event, InMemoryQueue, LogPublisher, PublishError};
    use crate::entity::Entity;
    use crate::store::{InMemoryStore, Store};

    struct Refusing;

    impl Publisher for Refusing {
        fn publish(&self, _event: Event) -> Result<(), PublishError> {
            Err(PublishError::ConnectionFailed("broker unreachable".into()))
        }
    }

    fn store_with(messages: Vec<OutboxMessage>) -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut order = Entity::with_id("order-1");
        for message in messages {
            order.outbox(message);
        }
        store.commit(&mut order).unwrap();
        store
    }

    #[test]
    fn relay_builder() {
        let relay = OutboxRelay::new(LogPublisher::default())
            .with_worker_id("relay-test")
            .with_batch_size(5)
            .with_lease(Duration::from_secs(30))
            .with_max_attempts(2)
            .with_retention(Duration::from_secs(600));

        assert_eq!(relay.worker_id(), "relay-test");
        assert_eq!(relay.batch_size(), 5);
        assert_eq!(relay.lease(), Duration::from_secs(30));
        assert_eq!(relay.max_attempts(), 2);
        assert_eq!(relay.retention(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn drain_publishes_and_marks_sent() {
        let store = store_with(vec![
            OutboxMessage::new("OrderPlaced", b"1".to_vec()),
            OutboxMessage::new("OrderPaid", b"2".to_vec()),
        ]);
        let queue = InMemoryQueue::new();
        let relay = OutboxRelay::new(queue.clone());

        let result = relay.drain(&store).unwrap();
        assert_eq!(result, DrainResult { claimed: 2, completed: 2, ..DrainResult::default() });
        assert_eq!(queue.event_types(), vec!["OrderPlaced", "OrderPaid"]);
        assert!(store.pending().unwrap().is_empty());
        assert_eq!(store.counts().unwrap().published, 2);

        assert_eq!(relay.drain(&store).unwrap(), DrainResult::default());
    }

    #[test]
    fn destination_uses_send() {
        let store = store_with(vec![
            OutboxMessage::new("ChargeCard", b"{}".to_vec()).with_destination("billing"),
        ]);
        let queue = InMemoryQueue::new();
        OutboxRelay::new(queue.clone()).drain(&store).unwrap();

        assert!(queue.is_empty());
        assert_eq!(queue.receive("billing").unwrap().unwrap().event_type, "ChargeCard");
    }

    #[test]
    fn failures_release_then_dead_letter() {
        let store = store_with(vec![OutboxMessage::new("OrderPlaced", Vec::new())]);
        let relay = OutboxRelay::new(Refusing).with_max_attempts(2);

        let first = relay.drain(&store).unwrap();
        assert_eq!(first.released, 1);
        let pending = store.pending().unwrap();
        assert_eq!(pending[0].last_error.as_deref(), Some("connection failed: broker unreachable"));

        let second = relay.drain(&store).unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(store.counts().unwrap().failed, 1);
        assert_eq!(relay.drain(&store).unwrap().claimed, 0);
    }

    #[test]
    fn lost_lease_is_counted() {
        let store = store_with(vec![OutboxMessage::new("OrderPlaced", Vec::new())]);
        let queue = InMemoryQueue::new();
        let slow = OutboxRelay::new(queue.clone())
            .with_worker_id("relay-slow")
            .with_lease(Duration::ZERO);

        let claimed = store.claim(slow.worker_id(), 10, slow.lease()).unwrap();
        // lease already expired, a second relay takes the message over
        store.claim("relay-fast", 10, Duration::from_secs(60)).unwrap();

        assert_eq!(slow.deliver(&store, &claimed[0]).unwrap(), Delivery::Lost);
        assert_eq!(queue.len(), 1);
        assert_eq!(store.counts().unwrap().in_flight, 1);
    }

    #[test]
    fn default_relays_do_not_share_a_lease() {
        let store = store_with(vec![OutboxMessage::new("OrderPlaced", Vec::new())]);
        let queue = InMemoryQueue::new();
        let stale = OutboxRelay::new(queue.clone()).with_lease(Duration::ZERO);
        let holder = OutboxRelay::new(queue.clone());
        assert_ne!(stale.worker_id(), holder.worker_id());

        let claimed = store.claim(stale.worker_id(), 10, stale.lease()).unwrap();
        let taken = store.claim(holder.worker_id(), 10, holder.lease()).unwrap();
        assert_eq!(taken.len(), 1);

        assert_eq!(stale.deliver(&store, &claimed[0]).unwrap(), Delivery::Lost);
        assert_eq!(holder.deliver(&store, &taken[0]).unwrap(), Delivery::Completed);
        assert_eq!(queue.len(), 2);
        assert_eq!(store.counts().unwrap().published, 1);
    }

    #[test]
    fn zero_batch_size_still_drains() {
        let store = store_with(vec![
            OutboxMessage::new("OrderPlaced", Vec::new()),
            OutboxMessage::new("OrderPaid", Vec::new()),
        ]);
        let relay = OutboxRelay::new(InMemoryQueue::new()).with_batch_size(0);
        assert_eq!(relay.batch_size(), 1);

        let mut config = RelayConfig::default();
        config.batch_size = 0;
        assert_eq!(OutboxRelay::from_config(&config, InMemoryQueue::new()).batch_size(), 1);

        assert_eq!(relay.drain(&store).unwrap().completed, 1);
        assert_eq!(relay.drain(&store).unwrap().completed, 1);
    }

    #[test]
    fn drain_through_shared_handles() {
        let store = Arc::new(store_with(vec![OutboxMessage::new("OrderPlaced", Vec::new())]));
        let queue = Arc::new(InMemoryQueue::new());
        let relay = OutboxRelay::new(Arc::clone(&queue));

        assert_eq!(relay.drain(store.as_ref()).unwrap().completed, 1);
        assert_eq!(queue.len(), 1);
    }
}
