//! Outbox relay: claims committed messages, delivers them, marks them sent.
//!
//! - `OutboxRelay` - one drain pass over the store
//! - `RelayThread` - background loop with polling, wake-ups and retention
//! - `http` - health and statistics endpoints (requires the `http` feature)
//!
//! Delivery is at-least-once. A message is marked sent only after the
//! publisher accepted it, so a crash or a lost lease between the two steps
//! leads to a redelivery with the same event id.

#[cfg(feature = "http")]
pub mod http;
mod relay;
mod thread;

pub use relay::{Delivery, DrainResult, OutboxRelay};
pub use thread::{Notifier, RelayMetrics, RelayStats, RelayThread};
