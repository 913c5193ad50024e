use thiserror::Error;

use crate::message::{MessageId, OutboxStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("concurrent write detected for entity {id} (expected version {expected}, got {actual})")]
    ConcurrentWrite {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid outbox message {id}: {reason}")]
    InvalidMessage { id: MessageId, reason: String },

    #[error("outbox message {0} already exists")]
    DuplicateMessage(MessageId),

    #[error("entity {0} appears more than once in a single commit")]
    DuplicateEntity(String),

    #[error("outbox message {0} not found")]
    MessageNotFound(MessageId),

    #[error("cannot {action} outbox message {id} while {from:?}")]
    InvalidTransition {
        id: MessageId,
        from: OutboxStatus,
        action: &'static str,
    },

    #[error("worker {worker_id} no longer holds the lease on outbox message {id}")]
    LeaseLost { id: MessageId, worker_id: String },
}

impl StoreError {
    pub(crate) fn invalid_message(id: MessageId, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            id,
            reason: reason.into(),
        }
    }
}
