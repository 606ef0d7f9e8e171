//! Event handlers that keep projections current.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use super::{ProductCatalog, UserRegistry};
use crate::bus::{spawn_consumer, AckMode, BusError, ConsumerHandle, EventBus, EventHandler};
use crate::events::{Event, Queue};

/// Queues that feed the product catalog.
pub const CATALOG_QUEUES: [Queue; 4] = [
    Queue::ProductCreated,
    Queue::ProductUpdated,
    Queue::ProductDeleted,
    Queue::InventoryUpdated,
];

/// Queues that feed the user registry.
pub const REGISTRY_QUEUES: [Queue; 2] = [Queue::UserRegistered, Queue::UserProfileUpdated];

/// Applies product and inventory events to a [`ProductCatalog`].
pub struct CatalogProjector {
    catalog: Arc<ProductCatalog>,
}

impl CatalogProjector {
    pub fn new(catalog: Arc<ProductCatalog>) -> Self {
        Self { catalog }
    }
}

impl EventHandler for CatalogProjector {
    fn handle(&self, event: Event) -> BoxFuture<'static, Result<(), BusError>> {
        let catalog = self.catalog.clone();
        async move {
            match event {
                Event::ProductCreated(product) | Event::ProductUpdated(product) => {
                    catalog.upsert(product).await;
                }
                Event::ProductDeleted(deleted) => {
                    catalog.remove(deleted.product_id).await;
                }
                Event::InventoryUpdated(update) => {
                    catalog
                        .apply_inventory(update.product_id, update.new_inventory)
                        .await;
                }
                other => {
                    debug!(queue = %other.queue(), "Catalog ignoring event");
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// Applies user events to a [`UserRegistry`].
pub struct RegistryProjector {
    registry: Arc<UserRegistry>,
}

impl RegistryProjector {
    pub fn new(registry: Arc<UserRegistry>) -> Self {
        Self { registry }
    }
}

impl EventHandler for RegistryProjector {
    fn handle(&self, event: Event) -> BoxFuture<'static, Result<(), BusError>> {
        let registry = self.registry.clone();
        async move {
            match event {
                Event::UserRegistered(user) | Event::UserProfileUpdated(user) => {
                    registry.upsert(user).await;
                }
                other => {
                    debug!(queue = %other.queue(), "Registry ignoring event");
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// Start one consumer per catalog queue.
pub fn spawn_catalog_consumers(
    bus: Arc<dyn EventBus>,
    catalog: Arc<ProductCatalog>,
    ack_mode: AckMode,
) -> Vec<ConsumerHandle> {
    let handler: Arc<dyn EventHandler> = Arc::new(CatalogProjector::new(catalog));
    let handles: Vec<_> = CATALOG_QUEUES
        .into_iter()
        .map(|queue| spawn_consumer(bus.clone(), queue, ack_mode, handler.clone()))
        .collect();
    info!(consumers = handles.len(), "Product catalog consumers started");
    handles
}

/// Start one consumer per user queue.
pub fn spawn_registry_consumers(
    bus: Arc<dyn EventBus>,
    registry: Arc<UserRegistry>,
    ack_mode: AckMode,
) -> Vec<ConsumerHandle> {
    let handler: Arc<dyn EventHandler> = Arc::new(RegistryProjector::new(registry));
    let handles: Vec<_> = REGISTRY_QUEUES
        .into_iter()
        .map(|queue| spawn_consumer(bus.clone(), queue, ack_mode, handler.clone()))
        .collect();
    info!(consumers = handles.len(), "User registry consumers started");
    handles
}
