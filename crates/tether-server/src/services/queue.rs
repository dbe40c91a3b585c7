//! Command-delivery queue
//!
//! Consumes queued-command events from the bus and appends each command id
//! to the target device's pending queue in the shared store. The delivery
//! side (draining the queue when a device connects) is an external
//! collaborator; this module only maintains the per-device ordering.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ServiceError;
use crate::pubsub::{PubSub, TOPIC_COMMAND_QUEUED};
use crate::storage::Store;

const QUEUE_BUCKET: &str = "command_queue";

/// Per-device pending command queue, fed by the bus
#[derive(Debug)]
pub struct CommandQueue {
    store: Arc<dyn Store>,
    worker: JoinHandle<()>,
}

impl CommandQueue {
    /// Subscribe to queued-command events and start the background
    /// consumer. Must run inside a tokio runtime.
    pub fn new(store: Arc<dyn Store>, bus: Arc<PubSub>) -> Result<Self, ServiceError> {
        let mut events = bus.subscribe(TOPIC_COMMAND_QUEUED);
        let consumer_store = store.clone();

        let worker = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped events are lost, but the consumer must
                        // keep draining what remains.
                        warn!(skipped, "command queue lagged behind the bus");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let udid = event.payload["udid"].as_str().unwrap_or_default();
                let command_uuid = event.payload["command_uuid"].as_str().unwrap_or_default();
                if udid.is_empty() || command_uuid.is_empty() {
                    warn!(?event, "dropping malformed command event");
                    continue;
                }
                if let Err(e) = append_pending(&*consumer_store, udid, command_uuid) {
                    warn!(udid, command_uuid, error = %e, "failed to queue command");
                }
            }
            info!("command queue consumer stopped");
        });

        Ok(Self { store, worker })
    }

    /// Pending command ids for a device, oldest first
    pub fn pending(&self, udid: &str) -> Result<Vec<String>, ServiceError> {
        load_pending(&*self.store, udid)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

fn load_pending(store: &dyn Store, udid: &str) -> Result<Vec<String>, ServiceError> {
    match store.get(QUEUE_BUCKET, udid)? {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_slice(&raw)
            .map_err(|e| ServiceError::InvalidMessage(e.to_string())),
    }
}

fn append_pending(store: &dyn Store, udid: &str, command_uuid: &str) -> Result<(), ServiceError> {
    let mut pending = load_pending(store, udid)?;
    pending.push(command_uuid.to_string());
    let raw = serde_json::to_vec(&pending)
        .map_err(|e| ServiceError::InvalidMessage(e.to_string()))?;
    store.put(QUEUE_BUCKET, udid, &raw)?;
    Ok(())
}
