//! Domain events and the fixed queue topology.
//!
//! Every event tag travels on its own durable queue, named after the tag.
//! Payloads are plain JSON objects; there is no envelope, sequence number
//! or event id on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{NewOrder, Product, User};

/// Result type for event encoding and decoding.
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors that can occur while encoding or decoding event payloads.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed {queue} payload: {source}")]
    Json {
        queue: Queue,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
}

/// The fixed set of durable queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    InventoryUpdated,
    OrderPlaced,
    OrderShipped,
    UserRegistered,
    UserProfileUpdated,
}

impl Queue {
    /// Every queue in the topology.
    pub const ALL: [Queue; 8] = [
        Queue::ProductCreated,
        Queue::ProductUpdated,
        Queue::ProductDeleted,
        Queue::InventoryUpdated,
        Queue::OrderPlaced,
        Queue::OrderShipped,
        Queue::UserRegistered,
        Queue::UserProfileUpdated,
    ];

    /// Queues the order service publishes to or consumes from.
    pub const ORDER_SERVICE: [Queue; 8] = Queue::ALL;

    /// Queues the product service publishes to or consumes from.
    pub const PRODUCT_SERVICE: [Queue; 5] = [
        Queue::ProductCreated,
        Queue::ProductUpdated,
        Queue::ProductDeleted,
        Queue::InventoryUpdated,
        Queue::OrderPlaced,
    ];

    /// Broker-side queue name.
    pub const fn name(&self) -> &'static str {
        match self {
            Queue::ProductCreated => "product_created",
            Queue::ProductUpdated => "product_updated",
            Queue::ProductDeleted => "product_deleted",
            Queue::InventoryUpdated => "inventory_updated",
            Queue::OrderPlaced => "order_placed",
            Queue::OrderShipped => "order_shipped",
            Queue::UserRegistered => "user_registered",
            Queue::UserProfileUpdated => "user_profile_updated",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Queue {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        Queue::ALL
            .into_iter()
            .find(|q| q.name() == s)
            .ok_or_else(|| EventError::UnknownQueue(s.to_string()))
    }
}

/// Payload of `inventory_updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdateEvent {
    pub product_id: i64,
    pub new_inventory: i64,
}

/// Payload of `product_deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeletedEvent {
    pub product_id: i64,
}

/// Payload of `order_placed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub items: Vec<OrderItemInfo>,
}

impl OrderPlacedEvent {
    /// Payload announcing a freshly persisted order.
    pub fn for_order(order_id: i64, order: &NewOrder) -> Self {
        Self {
            order_id,
            user_id: order.user_id,
            items: order
                .items
                .iter()
                .map(|item| OrderItemInfo {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

/// One line of an `order_placed` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemInfo {
    pub product_id: i64,
    pub quantity: i64,
}

/// Payload of `order_shipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShippedEvent {
    pub order_id: i64,
}

/// A state-change notification, tagged by the queue it travels on.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProductCreated(Product),
    ProductUpdated(Product),
    ProductDeleted(ProductDeletedEvent),
    InventoryUpdated(InventoryUpdateEvent),
    OrderPlaced(OrderPlacedEvent),
    OrderShipped(OrderShippedEvent),
    UserRegistered(User),
    UserProfileUpdated(User),
}

impl Event {
    /// The queue this event is published to.
    pub fn queue(&self) -> Queue {
        match self {
            Event::ProductCreated(_) => Queue::ProductCreated,
            Event::ProductUpdated(_) => Queue::ProductUpdated,
            Event::ProductDeleted(_) => Queue::ProductDeleted,
            Event::InventoryUpdated(_) => Queue::InventoryUpdated,
            Event::OrderPlaced(_) => Queue::OrderPlaced,
            Event::OrderShipped(_) => Queue::OrderShipped,
            Event::UserRegistered(_) => Queue::UserRegistered,
            Event::UserProfileUpdated(_) => Queue::UserProfileUpdated,
        }
    }

    /// Serialize the payload (without tag) to JSON bytes.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let encoded = match self {
            Event::ProductCreated(p) | Event::ProductUpdated(p) => serde_json::to_vec(p),
            Event::ProductDeleted(e) => serde_json::to_vec(e),
            Event::InventoryUpdated(e) => serde_json::to_vec(e),
            Event::OrderPlaced(e) => serde_json::to_vec(e),
            Event::OrderShipped(e) => serde_json::to_vec(e),
            Event::UserRegistered(u) | Event::UserProfileUpdated(u) => serde_json::to_vec(u),
        };
        encoded.map_err(|source| EventError::Json {
            queue: self.queue(),
            source,
        })
    }

    /// Decode a raw payload received on `queue`.
    pub fn decode(queue: Queue, payload: &[u8]) -> Result<Self> {
        let wrap = |source: serde_json::Error| EventError::Json { queue, source };
        let event = match queue {
            Queue::ProductCreated => Event::ProductCreated(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::ProductUpdated => Event::ProductUpdated(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::ProductDeleted => Event::ProductDeleted(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::InventoryUpdated => {
                Event::InventoryUpdated(serde_json::from_slice(payload).map_err(wrap)?)
            }
            Queue::OrderPlaced => Event::OrderPlaced(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::OrderShipped => Event::OrderShipped(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::UserRegistered => Event::UserRegistered(serde_json::from_slice(payload).map_err(wrap)?),
            Queue::UserProfileUpdated => {
                Event::UserProfileUpdated(serde_json::from_slice(payload).map_err(wrap)?)
            }
        };
        Ok(event)
    }
}
