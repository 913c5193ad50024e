//! Persistence seam for entities and their outbox.
//!
//! A backend implements [`Store`] for the write side and [`OutboxStore`] for
//! the relay side. Both must observe the same commits: a message becomes
//! claimable only once the commit that wrote it has finished.

mod in_memory;

use std::time::Duration;

use serde::Serialize;

use crate::entity::{Committable, Entity};
use crate::error::StoreError;
use crate::message::{MessageId, OutboxMessage, OutboxStatus};

pub use in_memory::InMemoryStore;

/// Write side: entity history plus queued outbox messages.
pub trait Store {
    /// Load an entity by id.
    fn get(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Persist every entity in `committable` together with the outbox
    /// messages queued on them. Either everything is written or nothing is.
    fn commit<C: Committable + ?Sized>(&self, committable: &mut C) -> Result<(), StoreError>;
}

/// Per-status message counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub published: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.published + self.failed
    }

    pub(crate) fn add(&mut self, status: OutboxStatus) {
        match status {
            OutboxStatus::Pending => self.pending += 1,
            OutboxStatus::InFlight => self.in_flight += 1,
            OutboxStatus::Published => self.published += 1,
            OutboxStatus::Failed => self.failed += 1,
        }
    }
}

/// Relay side: leasing, completing and cleaning up outbox messages.
pub trait OutboxStore: Send + Sync {
    fn message(&self, id: &MessageId) -> Result<Option<OutboxMessage>, StoreError>;

    /// Messages with the given status, in commit order.
    fn messages_by_status(&self, status: OutboxStatus) -> Result<Vec<OutboxMessage>, StoreError>;

    fn pending(&self) -> Result<Vec<OutboxMessage>, StoreError> {
        self.messages_by_status(OutboxStatus::Pending)
    }

    fn counts(&self) -> Result<StatusCounts, StoreError>;

    /// Lease up to `max` claimable messages to `worker_id`, oldest first.
    fn claim(
        &self,
        worker_id: &str,
        max: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Mark a leased message as sent.
    fn complete(&self, id: &MessageId, worker_id: &str) -> Result<(), StoreError>;

    /// Return a leased message to the pending pool after a failed delivery.
    fn release(&self, id: &MessageId, worker_id: &str, error: &str) -> Result<(), StoreError>;

    /// Dead-letter a leased message.
    fn fail(&self, id: &MessageId, worker_id: &str, error: &str) -> Result<(), StoreError>;

    /// Move a dead-lettered message back to pending.
    fn requeue(&self, id: &MessageId) -> Result<(), StoreError>;

    /// Delete published messages sent more than `older_than` ago.
    fn purge_published(&self, older_than: Duration) -> Result<usize, StoreError>;
}
