//! Mock event bus implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AckMode, BusError, DeliveryStream, EventBus, Result};

/// A message captured by `MockEventBus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub queue: String,
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
}

/// Mock event bus for testing.
///
/// Records every publish. When built with `forwarding`, publishes and
/// consumes also go through to the wrapped bus, so tests can observe
/// traffic while real consumers keep running.
#[derive(Default)]
pub struct MockEventBus {
    inner: Option<Arc<dyn EventBus>>,
    published: RwLock<Vec<PublishedMessage>>,
    declared: RwLock<Vec<String>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record traffic and forward it to `inner`.
    pub fn forwarding(inner: Arc<dyn EventBus>) -> Self {
        Self {
            inner: Some(inner),
            ..Self::default()
        }
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Messages published to `queue`, oldest first.
    pub async fn published_to(&self, queue: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.queue == queue)
            .cloned()
            .collect()
    }

    pub async fn declared(&self) -> Vec<String> {
        self.declared.read().await.clone()
    }

    async fn record(&self, queue: &str, payload: &[u8], message_id: Option<&str>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(PublishedMessage {
            queue: queue.to_string(),
            payload: payload.to_vec(),
            message_id: message_id.map(str::to_string),
        });
        Ok(())
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn declare(&self, queue: &str) -> Result<()> {
        {
            let mut declared = self.declared.write().await;
            if !declared.iter().any(|q| q == queue) {
                declared.push(queue.to_string());
            }
        }
        match &self.inner {
            Some(inner) => inner.declare(queue).await,
            None => Ok(()),
        }
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.record(queue, payload, None).await?;
        match &self.inner {
            Some(inner) => inner.publish(queue, payload).await,
            None => Ok(()),
        }
    }

    async fn publish_with_id(&self, queue: &str, payload: &[u8], message_id: &str) -> Result<()> {
        self.record(queue, payload, Some(message_id)).await?;
        match &self.inner {
            Some(inner) => inner.publish_with_id(queue, payload, message_id).await,
            None => Ok(()),
        }
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream> {
        match &self.inner {
            Some(inner) => inner.consume(queue, ack_mode).await,
            None => Err(BusError::SubscribeNotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_bus_records_publish() {
        let bus = MockEventBus::new();
        bus.publish("order_placed", b"{}").await.unwrap();
        bus.publish_with_id("order_placed", b"{}", "7").await.unwrap();

        let published = bus.published_to("order_placed").await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].message_id, None);
        assert_eq!(published[1].message_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_mock_bus_fail_on_publish() {
        let bus = MockEventBus::new();
        bus.set_fail_on_publish(true).await;

        let result = bus.publish("order_placed", b"{}").await;
        assert!(matches!(result, Err(BusError::Publish(_))));
        assert_eq!(bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_bus_take_published_clears() {
        let bus = MockEventBus::new();
        bus.publish("order_shipped", b"{}").await.unwrap();

        assert_eq!(bus.take_published().await.len(), 1);
        assert_eq!(bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_bus_consume_without_inner_not_supported() {
        let bus = MockEventBus::new();
        let result = bus.consume("order_placed", AckMode::Auto).await;
        assert!(matches!(result, Err(BusError::SubscribeNotSupported)));
    }

    #[tokio::test]
    async fn test_mock_bus_declare_is_idempotent() {
        let bus = MockEventBus::new();
        bus.declare("order_placed").await.unwrap();
        bus.declare("order_placed").await.unwrap();
        assert_eq!(bus.declared().await, vec!["order_placed"]);
    }
}
