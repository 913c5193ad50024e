//! Order domain used across the integration tests.

use outbox_relay::{Entity, OutboxMessage, Store, StoreError, TransactionalWriter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub sku: String,
    pub quantity: u32,
}

/// Place a new order: one domain event, one fan-out event, one command to
/// the inventory queue, all in the same commit.
pub fn place_order<S: Store>(
    writer: &TransactionalWriter<S>,
    order_id: &str,
    sku: &str,
    quantity: u32,
) -> Result<Entity, StoreError> {
    let placed = OrderPlaced {
        order_id: order_id.to_string(),
        sku: sku.to_string(),
        quantity,
    };

    let mut order = Entity::with_id(order_id);
    order.digest("OrderPlaced", &placed).expect("encode OrderPlaced");

    let event = OutboxMessage::json("OrderPlaced", &placed)
        .expect("encode OrderPlaced")
        .with_correlation_id(format!("req-{order_id}"));
    let command = OutboxMessage::json(
        "ReserveStock",
        &ReserveStock {
            sku: sku.to_string(),
            quantity,
        },
    )
    .expect("encode ReserveStock")
    .with_destination("inventory");

    writer.outbox(event).and(command).commit(&mut order)?;
    Ok(order)
}
