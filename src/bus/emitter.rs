use std::sync::Mutex;

use event_emitter_rs::EventEmitter;

use super::{Event, PublishError, Publisher};

/// Publisher that hands events to in-process listeners via an `EventEmitter`.
///
/// Listeners receive the payload as a UTF-8 string. `publish` returns once
/// every listener has run.
pub struct LocalEmitterPublisher {
    emitter: Mutex<EventEmitter>,
}

impl LocalEmitterPublisher {
    pub fn new(emitter: EventEmitter) -> Self {
        LocalEmitterPublisher {
            emitter: Mutex::new(emitter),
        }
    }
}

impl Publisher for LocalEmitterPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&event.payload).into_owned();
        let handles = self
            .emitter
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("emitter lock poisoned".into()))?
            .emit(&event.event_type, payload);

        for handle in handles {
            handle
                .join()
                .map_err(|_| PublishError::Rejected(format!("listener for {} panicked", event.event_type)))?;
        }
        Ok(())
    }
}
