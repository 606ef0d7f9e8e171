//! order-mesh-orders: order service runtime
//!
//! Connects to the database and broker, warms the product catalog and user
//! registry from their owning services, then keeps both current from the
//! event queues. With the outbox enabled, a relay task publishes staged
//! `order_placed` rows.
//!
//! Requires a shared broker (`messaging.type: amqp`). For a single-process
//! mesh on the in-process bus, run order-mesh-standalone.
//!
//! ## Configuration
//! - First argument: optional config file path
//! - ORDER_MESH_CONFIG: config file path
//! - ORDER_MESH__*: per-key overrides (e.g. ORDER_MESH__MESSAGING__TYPE=amqp)
//! - ORDER_MESH_LOG: tracing filter (default: info)

use std::time::Duration;

use tracing::info;

use order_mesh::bus::{declare_topology, init_event_bus};
use order_mesh::clients::ServiceClient;
use order_mesh::config::Config;
use order_mesh::events::Queue;
use order_mesh::runtime::OrderRuntime;
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
    declare_topology(bus.as_ref(), &Queue::ORDER_SERVICE).await?;

    let client = ServiceClient::with_timeout(
        &config.services,
        Duration::from_secs(config.services.request_timeout_secs),
    )?;

    let runtime = OrderRuntime::start(&config, &stores, bus, &client, &client).await;
    info!(consumers = runtime.consumer_count(), "order-mesh-orders started");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    runtime.stop().await;
    Ok(())
}
