//! order-mesh-products: product service runtime
//!
//! Owns the authoritative product table. Consumes `order_placed` and
//! decrements inventory for each ordered item, announcing every new level
//! on `inventory_updated`.
//!
//! ## Configuration
//! Same sources as order-mesh-orders; only `messaging`, `storage` and
//! `startup` are read. Requires a shared broker, like order-mesh-orders.

use tracing::info;

use order_mesh::bus::{declare_topology, init_event_bus};
use order_mesh::config::Config;
use order_mesh::events::Queue;
use order_mesh::runtime::ProductRuntime;
use order_mesh::storage::init_storage;
use order_mesh::utils::bootstrap::{connect_with_retry, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    config.require_shared_broker()?;

    let stores = connect_with_retry("database", &config.startup, || {
        init_storage(&config.storage)
    })
    .await?;
    let bus = connect_with_retry("message broker", &config.startup, || {
        init_event_bus(&config.messaging)
    })
    .await?;
    declare_topology(bus.as_ref(), &Queue::PRODUCT_SERVICE).await?;

    let runtime = ProductRuntime::start(&stores, bus, config.messaging.ack_mode);
    info!(
        products = runtime.service.list().await?.len(),
        "order-mesh-products started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    runtime.stop().await;
    Ok(())
}
