//! In-memory broker for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{Event, PublishError, Publisher, Subscriber};

/// In-memory broker implementing both `Publisher` and `Subscriber`.
///
/// - Published events go to an append-only log; every subscriber created with
///   [`InMemoryQueue::new_subscriber`] reads it from its own position.
/// - Events sent to a destination land in a named FIFO queue and are consumed
///   once by [`InMemoryQueue::receive`].
/// - Clones share everything, including the read position.
///
/// ```
/// use outbox_relay::bus::{Event, InMemoryQueue, Publisher, Subscriber};
///
/// let queue = InMemoryQueue::new();
/// queue.publish(Event::with_string_payload("evt-1", "OrderPlaced", "{}")).unwrap();
///
/// let event = queue.poll(100).unwrap().unwrap();
/// assert_eq!(event.event_type, "OrderPlaced");
/// ```
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    log: Arc<RwLock<Vec<Event>>>,
    queues: Arc<Mutex<HashMap<String, VecDeque<Event>>>>,
    position: Arc<Mutex<usize>>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber that shares the log but keeps its own read position.
    pub fn new_subscriber(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            queues: Arc::clone(&self.queues),
            position: Arc::new(Mutex::new(0)),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All published events, in publish order.
    pub fn events(&self) -> Vec<Event> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_type(&self, event_type: &str) -> Option<Event> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.event_type == event_type)
            .cloned()
    }

    /// Number of events waiting in a destination queue.
    pub fn queued(&self, destination: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .map_or(0, VecDeque::len)
    }

    /// Take the next event sent to `destination`.
    pub fn receive(&self, destination: &str) -> Result<Option<Event>, PublishError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("queue lock poisoned".into()))?;
        Ok(queues.get_mut(destination).and_then(VecDeque::pop_front))
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_event(&self) -> Result<Option<Event>, PublishError> {
        let log = self
            .log
            .read()
            .map_err(|_| PublishError::ConnectionFailed("log lock poisoned".into()))?;
        let mut pos = self
            .position
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("position lock poisoned".into()))?;

        match log.get(*pos) {
            Some(event) => {
                *pos += 1;
                Ok(Some(event.clone()))
            }
            None => Ok(None),
        }
    }
}

impl Publisher for InMemoryQueue {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.log
            .write()
            .map_err(|_| PublishError::ConnectionFailed("log lock poisoned".into()))?
            .push(event);
        Ok(())
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        self.log
            .write()
            .map_err(|_| PublishError::ConnectionFailed("log lock poisoned".into()))?
            .extend(events);
        Ok(())
    }

    fn send(&self, destination: &str, event: Event) -> Result<(), PublishError> {
        self.queues
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("queue lock poisoned".into()))?
            .entry(destination.to_string())
            .or_default()
            .push_back(event);
        Ok(())
    }
}

impl Subscriber for InMemoryQueue {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Some(event) = self.next_event()? {
                return Ok(Some(event));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, event_id: &str) -> Result<(), PublishError> {
        self.acked
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("ack lock poisoned".into()))?
            .push(event_id.to_string());
        Ok(())
    }

    fn nack(&self, _event_id: &str, _reason: &str) -> Result<(), PublishError> {
        // the log is append-only; a nacked event simply stays where it is
        Ok(())
    }
}
