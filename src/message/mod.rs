mod message;

pub use message::{MessageId, OutboxMessage, OutboxStatus};
