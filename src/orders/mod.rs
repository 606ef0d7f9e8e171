//! Order placement and queries.
//!
//! Placement moves through `Validating -> Persisting -> Committed ->
//! EventEmitted`. Validation and pricing read the product catalog
//! projection, never the product service, so prices are whatever the
//! projection held when the request arrived. Persistence is one transaction;
//! the `OrderPlaced` notification goes out only after commit and its failure
//! never undoes the order.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bus::{emit, EventBus};
use crate::events::{Event, OrderPlacedEvent, OrderShippedEvent};
use crate::model::{
    order_total, Money, NewOrder, NewOrderItem, Order, OrderInput, STATUS_PLACED,
    STATUS_SHIPPED,
};
use crate::projection::ProductCatalog;
use crate::storage::{OrderStore, StorageError};

/// Confirmation returned for a placed order.
pub const ORDER_PLACED_MESSAGE: &str = "Order placed successfully";

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors surfaced to order callers.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Product {0} not found")]
    ProductNotFound(i64),

    #[error("Order has no items")]
    EmptyOrder,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i64 },

    #[error("Order total exceeds the representable amount")]
    TotalOverflow,

    #[error("Failed to create order")]
    CreateFailed(#[source] StorageError),

    #[error("Order {0} not found")]
    NotFound(i64),

    #[error("Order {order_id} does not belong to the requesting user")]
    AccessDenied { order_id: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Progress of a single placement, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStage {
    Validating,
    Persisting,
    Committed,
    EventEmitted,
}

impl fmt::Display for PlacementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlacementStage::Validating => "validating",
            PlacementStage::Persisting => "persisting",
            PlacementStage::Committed => "committed",
            PlacementStage::EventEmitted => "event_emitted",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub total: Money,
    pub message: &'static str,
}

/// Places, queries and ships orders for the order service.
pub struct OrderWorkflow {
    catalog: Arc<ProductCatalog>,
    store: Arc<dyn OrderStore>,
    bus: Arc<dyn EventBus>,
    use_outbox: bool,
}

impl OrderWorkflow {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        store: Arc<dyn OrderStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            catalog,
            store,
            bus,
            use_outbox: false,
        }
    }

    /// Stage `OrderPlaced` in the outbox instead of publishing it directly.
    pub fn with_outbox(mut self, enabled: bool) -> Self {
        self.use_outbox = enabled;
        self
    }

    /// Validate, price, persist and announce an order.
    pub async fn place_order(&self, user_id: i64, input: &OrderInput) -> Result<PlacedOrder> {
        debug!(user_id, stage = %PlacementStage::Validating, "Placing order");
        let order = self.price_order(user_id, input).await?;

        debug!(user_id, stage = %PlacementStage::Persisting, items = order.items.len(), "Persisting order");
        let order_id = self
            .store
            .insert_order(&order, self.use_outbox)
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "Order transaction rolled back");
                OrderError::CreateFailed(e)
            })?;
        info!(
            order_id,
            user_id,
            total = %order.total,
            stage = %PlacementStage::Committed,
            "Order committed"
        );

        if self.use_outbox {
            debug!(order_id, "OrderPlaced staged in outbox");
        } else {
            let event = Event::OrderPlaced(OrderPlacedEvent::for_order(order_id, &order));
            emit(self.bus.as_ref(), &event).await;
            debug!(order_id, stage = %PlacementStage::EventEmitted, "Order placement finished");
        }

        Ok(PlacedOrder {
            order_id,
            total: order.total,
            message: ORDER_PLACED_MESSAGE,
        })
    }

    /// Check every line against the catalog and capture unit prices.
    async fn price_order(&self, user_id: i64, input: &OrderInput) -> Result<NewOrder> {
        if input.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            if line.quantity <= 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            let product = self
                .catalog
                .get(line.product_id)
                .await
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            items.push(NewOrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
                price: product.price,
            });
        }

        let total = order_total(&items).ok_or_else(|| {
            warn!(user_id, "Order total overflows, rejecting");
            OrderError::TotalOverflow
        })?;

        Ok(NewOrder {
            user_id,
            status: STATUS_PLACED.to_string(),
            total,
            items,
        })
    }

    /// Fetch one of `user_id`'s orders.
    pub async fn get_order(&self, user_id: i64, order_id: i64) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        if order.user_id != user_id {
            return Err(OrderError::AccessDenied { order_id });
        }
        Ok(order)
    }

    /// Every order placed by `user_id`.
    pub async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    /// Mark an order shipped and announce it.
    pub async fn ship_order(&self, order_id: i64) -> Result<()> {
        if !self.store.set_status(order_id, STATUS_SHIPPED).await? {
            return Err(OrderError::NotFound(order_id));
        }
        info!(order_id, "Order shipped");
        emit(
            self.bus.as_ref(),
            &Event::OrderShipped(OrderShippedEvent { order_id }),
        )
        .await;
        Ok(())
    }
}
