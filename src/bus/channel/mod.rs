//! In-memory channel-based event bus for standalone mode.
//!
//! Each declared queue is an unbounded mpsc channel. Consumers on the same
//! queue share the receiver, so every message reaches exactly one of them,
//! as with competing consumers on a broker queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{AckMode, Acker, BusError, Delivery, DeliveryStream, EventBus, Result};

/// A message sitting in an in-process queue.
#[derive(Debug, Clone)]
struct Envelope {
    payload: Vec<u8>,
    message_id: Option<String>,
}

/// One declared queue.
#[derive(Clone)]
struct QueueSlot {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>,
}

impl QueueSlot {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

/// In-memory event bus using tokio mpsc channels.
///
/// Publishing to a queue that was never declared drops the message, the
/// same as an unroutable publish on a broker's default exchange.
#[derive(Clone, Default)]
pub struct ChannelEventBus {
    queues: Arc<RwLock<HashMap<String, QueueSlot>>>,
}

impl ChannelEventBus {
    /// Create a new channel event bus with no queues declared.
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, queue: &str) -> Option<QueueSlot> {
        self.queues.read().await.get(queue).cloned()
    }

    async fn send(&self, queue: &str, envelope: Envelope) -> Result<()> {
        let Some(slot) = self.slot(queue).await else {
            warn!(queue = %queue, "Publish to undeclared queue, message dropped");
            return Ok(());
        };
        slot.sender
            .send(envelope)
            .map_err(|e| BusError::Publish(format!("Channel closed: {}", e)))?;
        debug!(queue = %queue, "Published to channel");
        Ok(())
    }
}

/// Manual-ack handle that puts rejected messages back on their queue.
struct ChannelAcker {
    sender: mpsc::UnboundedSender<Envelope>,
    envelope: Envelope,
}

#[async_trait]
impl Acker for ChannelAcker {
    async fn ack(&self) -> Result<()> {
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        if requeue {
            self.sender
                .send(self.envelope.clone())
                .map_err(|e| BusError::Ack(format!("Channel closed: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn declare(&self, queue: &str) -> Result<()> {
        let mut queues = self.queues.write().await;
        if !queues.contains_key(queue) {
            queues.insert(queue.to_string(), QueueSlot::new());
            info!(queue = %queue, "Channel queue declared");
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.send(
            queue,
            Envelope {
                payload: payload.to_vec(),
                message_id: None,
            },
        )
        .await
    }

    async fn publish_with_id(&self, queue: &str, payload: &[u8], message_id: &str) -> Result<()> {
        self.send(
            queue,
            Envelope {
                payload: payload.to_vec(),
                message_id: Some(message_id.to_string()),
            },
        )
        .await
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream> {
        let slot = self
            .slot(queue)
            .await
            .ok_or_else(|| BusError::Subscribe(format!("Queue '{}' not declared", queue)))?;

        let stream = futures::stream::unfold(slot, move |slot| async move {
            // The lock is held only while waiting, so competing consumers
            // take turns receiving.
            let envelope = slot.receiver.lock().await.recv().await?;
            let delivery = Delivery::new(envelope.payload.clone(), envelope.message_id.clone());
            let delivery = match ack_mode {
                AckMode::Auto => delivery,
                AckMode::Manual => delivery.with_acker(Box::new(ChannelAcker {
                    sender: slot.sender.clone(),
                    envelope,
                })),
            };
            Some((Ok(delivery), slot))
        });

        Ok(Box::pin(stream))
    }
}
