//! order-mesh-standalone: both services in one process
//!
//! Runs the product and order runtimes side by side on one event bus and one
//! database. With the default `standalone` profile that is the in-process
//! channel bus and SQLite, so `order_placed` and `inventory_updated` flow
//! between the services without an external broker.
//!
//! ## Architecture
//! ```text
//! order-mesh-standalone (single process)
//!     ├── ProductRuntime: ProductService + InventoryReconciler
//!     ├── OrderRuntime:   ProductCatalog + UserRegistry consumers,
//!     │                   OrderWorkflow, optional OutboxRelay
//!     ├── EventBus (shared; channel by default)
//!     └── Storage (shared; all tables in one database)
//! ```
//!
//! The catalog is warmed from the in-process product service. Users still
//! come from the user service at `services.user_service_url`.
//!
//! ## Configuration
//! Same sources as order-mesh-orders.

use std::time::Duration;

use tracing::info;

use order_mesh::bus::{declare_topology, init_event_bus};
use order_mesh::clients::ServiceClient;
use order_mesh::config::Config;
use order_mesh::events::Queue;
use order_mesh::runtime::{OrderRuntime, ProductRuntime};
use order_mesh::storage::init_storage;
use order_mesh::utils::bootstrap::{connect_with_retry, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let stores = connect_with_retry("database", &config.startup, || {
        init_storage(&config.storage)
    })
    .await?;
    let bus = connect_with_retry("message broker", &config.startup, || {
        init_event_bus(&config.messaging)
    })
    .await?;
    declare_topology(bus.as_ref(), &Queue::ALL).await?;

    let users = ServiceClient::with_timeout(
        &config.services,
        Duration::from_secs(config.services.request_timeout_secs),
    )?;

    let products = ProductRuntime::start(&stores, bus.clone(), config.messaging.ack_mode);
    let orders = OrderRuntime::start(&config, &stores, bus, &products.service, &users).await;
    info!(
        consumers = orders.consumer_count() + 1,
        "order-mesh-standalone started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    orders.stop().await;
    products.stop().await;
    Ok(())
}
