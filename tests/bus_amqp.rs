//! AMQP/RabbitMQ event bus integration tests using testcontainers.
//!
//! Run with: cargo test --test bus_amqp --features amqp -- --ignored --nocapture
//!
//! These tests spin up RabbitMQ in a container. No manual broker setup
//! required, but a container runtime is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use order_mesh::bus::{
    declare_topology, publish_event, spawn_consumer, AckMode, AmqpBusConfig, AmqpEventBus,
    BusError, EventBus, EventHandler,
};
use order_mesh::events::{Event, OrderShippedEvent, Queue};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

/// Start RabbitMQ container.
///
/// Returns (container, amqp_url).
async fn start_rabbitmq() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    let image = GenericImage::new("rabbitmq", "3-management")
        .with_exposed_port(5672.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Server startup complete"));

    let container = image
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start rabbitmq container");

    // Brief delay to ensure RabbitMQ is fully ready
    tokio::time::sleep(Duration::from_secs(2)).await;

    let host_port = container
        .get_host_port_ipv4(5672)
        .await
        .expect("Failed to get mapped port");
    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let amqp_url = format!("amqp://guest:guest@{}:{}/%2f", host, host_port);
    println!("RabbitMQ available at: {}", amqp_url);
    (container, amqp_url)
}

async fn connect(url: &str) -> Arc<dyn EventBus> {
    let bus = AmqpEventBus::new(&AmqpBusConfig {
        url: url.to_string(),
        pool_size: 4,
    })
    .await
    .expect("Failed to connect to RabbitMQ");
    Arc::new(bus)
}

struct CountingHandler {
    seen: Arc<AtomicUsize>,
}

impl EventHandler for CountingHandler {
    fn handle(&self, _event: Event) -> BoxFuture<'static, Result<(), BusError>> {
        let seen = self.seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}

#[tokio::test]
#[ignore = "requires a container runtime"]
async fn test_declared_queues_survive_reconnect() {
    let (_container, url) = start_rabbitmq().await;

    let bus = connect(&url).await;
    declare_topology(bus.as_ref(), &Queue::ALL).await.unwrap();
    publish_event(
        bus.as_ref(),
        &Event::OrderShipped(OrderShippedEvent { order_id: 5 }),
    )
    .await
    .unwrap();
    drop(bus);

    // The message waits in the durable queue for a consumer on a new connection.
    let bus = connect(&url).await;
    let mut stream = bus.consume("order_shipped", AckMode::Auto).await.unwrap();
    let delivery = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("No delivery within timeout")
        .unwrap()
        .unwrap();
    assert_eq!(delivery.payload, br#"{"order_id":5}"#.to_vec());
}

#[tokio::test]
#[ignore = "requires a container runtime"]
async fn test_message_id_travels_with_delivery() {
    let (_container, url) = start_rabbitmq().await;
    let bus = connect(&url).await;
    bus.declare("order_placed").await.unwrap();

    bus.publish_with_id("order_placed", b"{}", "outbox-17")
        .await
        .unwrap();

    let mut stream = bus.consume("order_placed", AckMode::Manual).await.unwrap();
    let delivery = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("No delivery within timeout")
        .unwrap()
        .unwrap();
    assert_eq!(delivery.message_id.as_deref(), Some("outbox-17"));
    delivery.ack().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a container runtime"]
async fn test_competing_consumers_each_message_once() {
    let (_container, url) = start_rabbitmq().await;
    let bus = connect(&url).await;
    bus.declare("order_shipped").await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            spawn_consumer(
                bus.clone(),
                Queue::OrderShipped,
                AckMode::Manual,
                Arc::new(CountingHandler { seen: seen.clone() }),
            )
        })
        .collect();

    for order_id in 0..10 {
        publish_event(
            bus.as_ref(),
            &Event::OrderShipped(OrderShippedEvent { order_id }),
        )
        .await
        .unwrap();
    }

    for _ in 0..100 {
        if seen.load(Ordering::SeqCst) >= 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 10);

    for handle in handles {
        handle.stop().await;
    }
}
