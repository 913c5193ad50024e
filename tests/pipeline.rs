mod support;

use std::sync::Arc;
use std::time::Duration;

use outbox_relay::bus::{InMemoryQueue, Subscriber};
use outbox_relay::{
    Entity, InMemoryStore, OutboxMessage, OutboxRelay, OutboxStatus, OutboxStore, RelayThread,
    Store, StoreError, TransactionalWriter,
};
use support::order::{place_order, OrderPlaced, ReserveStock};
use support::publishers::FlakyPublisher;
use support::wait_until;

#[test]
fn committed_order_reaches_the_broker() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();
    let relay = OutboxRelay::new(broker.clone()).with_worker_id("relay-a");

    let order = place_order(&writer, "order-1", "sku-9", 3).unwrap();
    assert!(!order.has_uncommitted_changes());
    assert_eq!(store.counts().unwrap().pending, 2);

    let result = relay.drain(&*store).unwrap();
    assert_eq!(result.claimed, 2);
    assert_eq!(result.completed, 2);

    let event = broker.find_by_type("OrderPlaced").unwrap();
    let placed: OrderPlaced = serde_json::from_slice(&event.payload).unwrap();
    assert_eq!(placed.order_id, "order-1");
    assert_eq!(event.meta("aggregate_id"), Some("order-1"));
    assert_eq!(event.meta(OutboxMessage::CORRELATION_ID), Some("req-order-1"));

    let command = broker.receive("inventory").unwrap().unwrap();
    let reserve: ReserveStock = serde_json::from_slice(&command.payload).unwrap();
    assert_eq!(reserve.quantity, 3);

    let counts = store.counts().unwrap();
    assert_eq!(counts.published, 2);
    assert_eq!(counts.pending, 0);
}

#[test]
fn event_id_matches_message_id() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();

    let message = OutboxMessage::new("Pinged", b"ping".to_vec());
    let id = message.id;
    let mut entity = Entity::with_id("pinger");
    writer.outbox(message).commit(&mut entity).unwrap();

    OutboxRelay::new(broker.clone()).drain(&*store).unwrap();

    let event = broker.find_by_type("Pinged").unwrap();
    assert_eq!(event.id, id.to_string());
    assert_eq!(event.payload_str(), Some("ping"));
}

#[test]
fn rejected_commit_leaves_no_messages() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    place_order(&writer, "order-1", "sku-1", 1).unwrap();

    // Stale copy: another writer already committed version 1.
    let mut stale = Entity::with_id("order-1");
    stale.digest("OrderCancelled", &"customer request").unwrap();
    stale.outbox(OutboxMessage::new("OrderCancelled", Vec::new()));

    let err = writer.commit(&mut stale).unwrap_err();
    assert!(matches!(err, StoreError::ConcurrentWrite { .. }));
    assert!(stale.has_uncommitted_changes());

    let counts = store.counts().unwrap();
    assert_eq!(counts.total(), 2);
    assert_eq!(store.get("order-1").unwrap().unwrap().version(), 1);
}

#[test]
fn multi_entity_commit_is_atomic() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));

    let mut existing = Entity::with_id("account-2");
    existing.digest("Opened", &0u64).unwrap();
    writer.commit(&mut existing).unwrap();

    let mut from = Entity::with_id("account-1");
    from.digest("Debited", &10u64).unwrap();
    from.outbox(OutboxMessage::new("TransferStarted", Vec::new()));
    let mut to = Entity::with_id("account-2");
    to.digest("Credited", &10u64).unwrap();

    let err = writer.commit(&mut [&mut from, &mut to]).unwrap_err();
    assert!(matches!(err, StoreError::ConcurrentWrite { .. }));

    assert!(store.get("account-1").unwrap().is_none());
    assert_eq!(store.counts().unwrap().total(), 0);
}

#[test]
fn failed_publish_is_retried_on_the_next_drain() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();
    let relay = OutboxRelay::new(FlakyPublisher::new(broker.clone(), 1)).with_worker_id("relay-a");

    let mut entity = Entity::with_id("job-1");
    writer
        .outbox(OutboxMessage::new("JobQueued", Vec::new()))
        .commit(&mut entity)
        .unwrap();

    let first = relay.drain(&*store).unwrap();
    assert_eq!(first.released, 1);
    assert!(broker.is_empty());

    let pending = store.pending().unwrap();
    assert_eq!(pending[0].attempts, 1);
    assert!(pending[0].last_error.as_deref().unwrap().contains("broker down"));

    let second = relay.drain(&*store).unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(broker.len(), 1);
    assert_eq!(relay.publisher().calls(), 2);
}

#[test]
fn dead_lettered_message_can_be_requeued() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();
    let relay = OutboxRelay::new(FlakyPublisher::new(broker.clone(), 1))
        .with_worker_id("relay-a")
        .with_max_attempts(1);

    let message = OutboxMessage::new("InvoiceIssued", Vec::new());
    let id = message.id;
    writer
        .outbox(message)
        .commit(&mut Entity::with_id("invoice-1"))
        .unwrap();

    assert_eq!(relay.drain(&*store).unwrap().failed, 1);
    assert_eq!(store.messages_by_status(OutboxStatus::Failed).unwrap().len(), 1);
    assert_eq!(relay.drain(&*store).unwrap().claimed, 0);

    store.requeue(&id).unwrap();
    assert_eq!(relay.drain(&*store).unwrap().completed, 1);
    assert!(store.message(&id).unwrap().unwrap().is_published());
}

#[test]
fn competing_relays_deliver_each_message_once() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();

    for n in 0..50 {
        let mut entity = Entity::with_id(format!("item-{n}"));
        writer
            .outbox(OutboxMessage::new("ItemAdded", n.to_string().into_bytes()))
            .commit(&mut entity)
            .unwrap();
    }

    let spawn = |id: &str| {
        let relay = OutboxRelay::new(broker.clone())
            .with_worker_id(id)
            .with_batch_size(5);
        RelayThread::spawn(Arc::clone(&store), relay, Duration::from_millis(5)).unwrap()
    };
    let a = spawn("relay-a");
    let b = spawn("relay-b");

    assert!(wait_until(Duration::from_secs(5), || {
        store.counts().map(|c| c.published == 50).unwrap_or(false)
    }));

    let stats_a = a.stop();
    let stats_b = b.stop();
    assert_eq!(stats_a.published + stats_b.published, 50);
    assert_eq!(stats_a.lost + stats_b.lost, 0);

    let mut payloads: Vec<String> = broker
        .events()
        .iter()
        .map(|event| event.payload_str().unwrap().to_string())
        .collect();
    payloads.sort();
    payloads.dedup();
    assert_eq!(payloads.len(), 50);
    assert_eq!(broker.len(), 50);
}

#[test]
fn subscriber_sees_relayed_events() {
    let store = Arc::new(InMemoryStore::new());
    let writer = TransactionalWriter::new(Arc::clone(&store));
    let broker = InMemoryQueue::new();
    let consumer = broker.new_subscriber();

    place_order(&writer, "order-7", "sku-7", 1).unwrap();
    OutboxRelay::new(broker.clone()).drain(&*store).unwrap();

    let event = consumer.poll(100).unwrap().unwrap();
    assert_eq!(event.event_type, "OrderPlaced");
    consumer.ack(&event.id).unwrap();
    assert_eq!(consumer.acknowledged(), vec![event.id]);
    assert!(consumer.poll(0).unwrap().is_none());
}
