//! Places a few orders and lets a background relay deliver their messages.
//!
//! ```sh
//! RUST_LOG=debug OUTBOX_BATCH_SIZE=10 cargo run --example orders
//! ```

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use outbox_relay::bus::LogPublisher;
use outbox_relay::telemetry::init_tracing;
use outbox_relay::{
    Entity, InMemoryStore, OutboxMessage, OutboxRelay, OutboxStore, RelayConfig, RelayThread,
    TransactionalWriter,
};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct OrderPlaced<'a> {
    order_id: &'a str,
    sku: &'a str,
    quantity: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = RelayConfig::load(None)?;
    let store = Arc::new(InMemoryStore::new());

    let relay = OutboxRelay::from_config(&config, LogPublisher::new());
    let relay_thread = RelayThread::spawn(Arc::clone(&store), relay, config.poll_interval())?;
    let writer = TransactionalWriter::new(Arc::clone(&store)).with_notifier(relay_thread.notifier());

    for (n, sku) in ["sku-red", "sku-green", "sku-blue"].into_iter().enumerate() {
        let order_id = format!("order-{}", n + 1);
        let placed = OrderPlaced {
            order_id: &order_id,
            sku,
            quantity: n as u32 + 1,
        };

        let mut order = Entity::with_id(order_id.as_str());
        order.digest("OrderPlaced", &placed)?;

        let written = writer
            .outbox(OutboxMessage::json("OrderPlaced", &placed)?)
            .and(OutboxMessage::json("ReserveStock", &placed)?.with_destination("inventory"))
            .commit(&mut order)?;
        info!(order_id = %order_id, messages = written, "order committed");
    }

    thread::sleep(Duration::from_millis(500));

    let stats = relay_thread.stop();
    let counts = store.counts()?;
    info!(
        published = stats.published,
        released = stats.released,
        failed = stats.failed,
        pending = counts.pending,
        "relay stopped"
    );
    Ok(())
}
