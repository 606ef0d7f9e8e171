//! Transactional outbox relay.
//!
//! When enabled, the `order_placed` payload is written to `outbox_events` in
//! the same transaction as the order rows. The relay task drains that table
//! in id order:
//!
//! 1. Publish the row to its queue with the row id as message id
//! 2. Delete the row on success
//! 3. Count a failed attempt otherwise and retry on the next pass
//!
//! Delivery is at-least-once. A crash between publish and delete republishes
//! the row, so consumers that care deduplicate on the message id.
//!
//! # Configuration
//!
//! ```yaml
//! outbox:
//!   enabled: true
//!   max_attempts: 10
//!   relay_interval_secs: 5
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::storage::{OutboxStore, Result};

/// Outbox configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Stage events in the outbox instead of publishing directly. Default: false.
    pub enabled: bool,
    /// Failed attempts after which a row is left for manual inspection. Default: 10.
    pub max_attempts: u32,
    /// Seconds between relay passes. Default: 5.
    pub relay_interval_secs: u64,
    /// Rows relayed per pass. Default: 100.
    pub batch_size: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 10,
            relay_interval_secs: 5,
            batch_size: 100,
        }
    }
}

/// Publishes staged outbox rows to the bus.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn OutboxStore>, bus: Arc<dyn EventBus>, config: OutboxConfig) -> Self {
        Self { store, bus, config }
    }

    /// Run one relay pass. Returns the number of rows published.
    pub async fn relay_pending(&self) -> Result<u32> {
        let rows = self
            .store
            .pending(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut relayed = 0u32;
        for row in rows {
            let message_id = row.id.to_string();
            match self
                .bus
                .publish_with_id(&row.queue, row.payload.as_bytes(), &message_id)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.store.delete(row.id).await {
                        // The row will be published again on the next pass.
                        error!(id = row.id, error = %e, "Failed to delete relayed outbox row");
                    } else {
                        relayed += 1;
                        debug!(id = row.id, queue = %row.queue, "Outbox row relayed");
                    }
                }
                Err(e) => {
                    warn!(
                        id = row.id,
                        queue = %row.queue,
                        attempts = row.attempts + 1,
                        error = %e,
                        "Outbox publish failed, will retry"
                    );
                    self.store.record_failure(row.id).await?;
                }
            }
        }

        if relayed > 0 {
            info!(relayed, "Relayed outbox rows");
        }
        Ok(relayed)
    }

    /// Spawn the periodic relay task.
    pub fn spawn(self) -> OutboxRelayHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let interval = Duration::from_secs(self.config.relay_interval_secs);

        let task = tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                "Outbox relay task started"
            );

            loop {
                if let Err(e) = self.relay_pending().await {
                    error!(error = %e, "Outbox relay pass failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel_rx.changed() => {
                        info!("Outbox relay task stopped");
                        break;
                    }
                }
            }
        });

        OutboxRelayHandle { cancel_tx, task }
    }
}

/// Handle to the running relay task.
pub struct OutboxRelayHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl OutboxRelayHandle {
    /// Signal the relay task to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.cancel_tx.send(true);
        let _ = self.task.await;
    }
}
