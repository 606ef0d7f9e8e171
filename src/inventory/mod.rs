//! Inventory reconciliation on the product service.
//!
//! Each `OrderPlaced` decrements the authoritative inventory of every
//! ordered product and announces the new level on `inventory_updated`.
//! Items are independent: one failing item is logged and the rest still
//! apply. There is no floor on inventory and no deduplication of
//! redelivered orders.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::bus::{emit, spawn_consumer, AckMode, BusError, ConsumerHandle, EventBus, EventHandler};
use crate::events::{Event, InventoryUpdateEvent, OrderPlacedEvent, Queue};
use crate::storage::ProductStore;

/// Applies placed orders to the product table.
#[derive(Clone)]
pub struct InventoryReconciler {
    store: Arc<dyn ProductStore>,
    bus: Arc<dyn EventBus>,
}

impl InventoryReconciler {
    pub fn new(store: Arc<dyn ProductStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    /// Decrement inventory for every line of `event`.
    ///
    /// Returns the number of lines applied.
    pub async fn handle_order_placed(&self, event: &OrderPlacedEvent) -> usize {
        let mut applied = 0;
        for item in &event.items {
            match self
                .store
                .decrement_inventory(item.product_id, item.quantity)
                .await
            {
                Ok(Some(new_inventory)) => {
                    if new_inventory < 0 {
                        warn!(
                            order_id = event.order_id,
                            product_id = item.product_id,
                            new_inventory,
                            "Inventory went negative"
                        );
                    }
                    let update = Event::InventoryUpdated(InventoryUpdateEvent {
                        product_id: item.product_id,
                        new_inventory,
                    });
                    emit(self.bus.as_ref(), &update).await;
                    applied += 1;
                }
                Ok(None) => {
                    warn!(
                        order_id = event.order_id,
                        product_id = item.product_id,
                        "Product not found, skipping inventory update"
                    );
                }
                Err(e) => {
                    error!(
                        order_id = event.order_id,
                        product_id = item.product_id,
                        error = %e,
                        "Failed to update inventory"
                    );
                }
            }
        }

        info!(
            order_id = event.order_id,
            applied,
            items = event.items.len(),
            "Order reconciled against inventory"
        );
        applied
    }

    /// Consume `order_placed` until the handle is stopped.
    pub fn spawn(self, ack_mode: AckMode) -> ConsumerHandle {
        let bus = self.bus.clone();
        spawn_consumer(bus, Queue::OrderPlaced, ack_mode, Arc::new(self))
    }
}

impl EventHandler for InventoryReconciler {
    fn handle(&self, event: Event) -> BoxFuture<'static, Result<(), BusError>> {
        let reconciler = self.clone();
        async move {
            match event {
                Event::OrderPlaced(order) => {
                    reconciler.handle_order_placed(&order).await;
                }
                other => debug!(queue = %other.queue(), "Reconciler ignoring event"),
            }
            Ok(())
        }
        .boxed()
    }
}
