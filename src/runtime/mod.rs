//! Service runtimes.
//!
//! `OrderRuntime` and `ProductRuntime` own the background work of each
//! service. The per-service binaries start one of them against a shared
//! broker. `order-mesh-standalone` starts both against a single bus, which is
//! the only way the in-process channel bus connects the two services.

use std::sync::Arc;

use tracing::info;

use crate::bus::{AckMode, ConsumerHandle, EventBus};
use crate::config::Config;
use crate::inventory::InventoryReconciler;
use crate::model::{Product, User};
use crate::orders::OrderWorkflow;
use crate::outbox::{OutboxRelay, OutboxRelayHandle};
use crate::products::ProductService;
use crate::projection::{
    spawn_catalog_consumers, spawn_registry_consumers, ProductCatalog, SnapshotSource,
    UserRegistry,
};
use crate::storage::Stores;

/// Order service: projections, their consumers, the workflow and the
/// optional outbox relay.
pub struct OrderRuntime {
    pub catalog: Arc<ProductCatalog>,
    pub registry: Arc<UserRegistry>,
    pub orders: OrderWorkflow,
    consumers: Vec<ConsumerHandle>,
    relay: Option<OutboxRelayHandle>,
}

impl OrderRuntime {
    /// Warm both projections from their snapshots, then follow the queues.
    ///
    /// Snapshots load before any consumer starts, so queued events apply on
    /// top of the snapshot rather than being overwritten by it.
    pub async fn start(
        config: &Config,
        stores: &Stores,
        bus: Arc<dyn EventBus>,
        products: &dyn SnapshotSource<Product>,
        users: &dyn SnapshotSource<User>,
    ) -> Self {
        let catalog = Arc::new(ProductCatalog::new());
        let registry = Arc::new(UserRegistry::new());
        catalog.load_snapshot(products).await;
        registry.load_snapshot(users).await;

        let ack_mode = config.messaging.ack_mode;
        let mut consumers = spawn_catalog_consumers(bus.clone(), catalog.clone(), ack_mode);
        consumers.extend(spawn_registry_consumers(bus.clone(), registry.clone(), ack_mode));

        let relay = config.outbox.enabled.then(|| {
            OutboxRelay::new(stores.outbox.clone(), bus.clone(), config.outbox.clone()).spawn()
        });

        let orders = OrderWorkflow::new(catalog.clone(), stores.orders.clone(), bus)
            .with_outbox(config.outbox.enabled);

        info!(
            products = catalog.len().await,
            users = registry.len().await,
            consumers = consumers.len(),
            outbox = config.outbox.enabled,
            "Order runtime started"
        );

        Self {
            catalog,
            registry,
            orders,
            consumers,
            relay,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub async fn stop(self) {
        for consumer in self.consumers {
            consumer.stop().await;
        }
        if let Some(relay) = self.relay {
            relay.stop().await;
        }
        info!("Order runtime stopped");
    }
}

/// Product service: the authoritative product operations and the
/// inventory reconciler.
pub struct ProductRuntime {
    pub service: ProductService,
    reconciler: ConsumerHandle,
}

impl ProductRuntime {
    pub fn start(stores: &Stores, bus: Arc<dyn EventBus>, ack_mode: AckMode) -> Self {
        let reconciler = InventoryReconciler::new(stores.products.clone(), bus.clone()).spawn(ack_mode);
        info!(ack_mode = ?ack_mode, "Product runtime started");
        Self {
            service: ProductService::new(stores.products.clone(), bus),
            reconciler,
        }
    }

    pub async fn stop(self) {
        self.reconciler.stop().await;
        info!("Product runtime stopped");
    }
}
