//! Transactional outbox.
//!
//! A [`TransactionalWriter`] commits domain changes and the messages they
//! produce as one unit; an [`OutboxRelay`] (usually inside a [`RelayThread`])
//! claims the committed messages, hands them to a [`bus::Publisher`] and marks
//! them sent once the broker accepted them.

pub mod bus;
mod config;
mod entity;
mod error;
mod message;
pub mod relay;
mod store;
pub mod telemetry;
mod writer;

pub use config::{ConfigError, RelayConfig};
pub use entity::{Committable, Entity, EventRecord};
pub use error::StoreError;
pub use message::{MessageId, OutboxMessage, OutboxStatus};
pub use relay::{Delivery, DrainResult, Notifier, OutboxRelay, RelayMetrics, RelayStats, RelayThread};
pub use store::{InMemoryStore, OutboxStore, StatusCounts, Store};
pub use writer::{OutboxCommit, TransactionalWriter};

#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
