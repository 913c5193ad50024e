use std::sync::{Arc, Mutex};

use tracing::info;

use super::{Event, PublishError, Publisher};

/// Publisher that writes every event to the tracing log.
///
/// With [`LogPublisher::with_buffer`] each line is also kept in a shared
/// buffer so tests and demos can inspect what was relayed.
#[derive(Clone, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }

    fn record(&self, line: String) -> Result<(), PublishError> {
        if let Some(buffer) = &self.buffer {
            buffer
                .lock()
                .map_err(|_| PublishError::ConnectionFailed("log buffer poisoned".into()))?
                .push(line);
        }
        Ok(())
    }
}

impl Publisher for LogPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&event.payload);
        info!(event_id = %event.id, event_type = %event.event_type, %payload, "outbox event");
        self.record(format!("[OUTBOX] {} {}", event.event_type, payload))
    }

    fn send(&self, destination: &str, event: Event) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&event.payload);
        info!(event_id = %event.id, event_type = %event.event_type, destination, %payload, "outbox command");
        self.record(format!("[OUTBOX -> {}] {} {}", destination, event.event_type, payload))
    }
}
