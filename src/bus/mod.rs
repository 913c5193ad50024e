//! Broker side of the outbox pipeline.
//!
//! ```text
//!  writer ──commit──▶ store ──claim──▶ relay ──publish/send──▶ Publisher
//!                                                          │
//!                        ┌─────────────────┬───────────────┴──────────┐
//!                        ▼                 ▼                          ▼
//!                 ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐
//!                 │InMemoryQueue│   │LogPublisher │   │ Kafka / NATS / AMQP  │
//!                 │ (included)  │   │ (included)  │   │ (host application)   │
//!                 └─────────────┘   └─────────────┘   └──────────────────────┘
//! ```

#[cfg(feature = "emitter")]
mod emitter;
mod in_memory_queue;
mod log_publisher;
mod publisher;

#[cfg(feature = "emitter")]
pub use emitter::LocalEmitterPublisher;
pub use in_memory_queue::InMemoryQueue;
pub use log_publisher::LogPublisher;
pub use publisher::{Event, PublishError, Publisher, Subscriber};
