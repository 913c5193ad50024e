//! Publishers with scripted failures.

use std::sync::atomic::{AtomicUsize, Ordering};

use outbox_relay::bus::{Event, InMemoryQueue, PublishError, Publisher};

/// Fails the first `failures` deliveries, then forwards to an in-memory queue.
pub struct FlakyPublisher {
    queue: InMemoryQueue,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyPublisher {
    pub fn new(queue: InMemoryQueue, failures: usize) -> Self {
        Self {
            queue,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<(), PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(PublishError::ConnectionFailed(format!("broker down (call {})", call + 1)))
        } else {
            Ok(())
        }
    }
}

impl Publisher for FlakyPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.attempt()?;
        self.queue.publish(event)
    }

    fn send(&self, destination: &str, event: Event) -> Result<(), PublishError> {
        self.attempt()?;
        self.queue.send(destination, event)
    }
}

/// Rejects everything.
pub struct DeadBroker;

impl Publisher for DeadBroker {
    fn publish(&self, _event: Event) -> Result<(), PublishError> {
        Err(PublishError::Timeout)
    }

    fn send(&self, _destination: &str, _event: Event) -> Result<(), PublishError> {
        Err(PublishError::Timeout)
    }
}
