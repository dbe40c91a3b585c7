//! Command service
//!
//! Accepts new MDM commands over the API, persists them, and announces
//! them on the bus so the command queue can schedule delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use crate::pubsub::{PubSub, TOPIC_COMMAND_QUEUED};
use crate::storage::Store;

const COMMANDS_BUCKET: &str = "commands";

/// Request to enqueue a new command for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Target device
    pub udid: String,
    /// MDM request type, e.g. `DeviceInformation`
    pub request_type: String,
    /// Free-form command arguments
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A persisted command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_uuid: Uuid,
    pub udid: String,
    pub request_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Creates and persists commands
#[derive(Debug)]
pub struct CommandService {
    store: Arc<dyn Store>,
    bus: Arc<PubSub>,
}

impl CommandService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<PubSub>) -> Result<Self, ServiceError> {
        Ok(Self { store, bus })
    }

    /// Persist a new command and announce it for queueing
    pub fn new_command(&self, request: CommandRequest) -> Result<Command, ServiceError> {
        if request.udid.is_empty() {
            return Err(ServiceError::InvalidMessage("missing UDID".into()));
        }
        if request.request_type.is_empty() {
            return Err(ServiceError::InvalidMessage("missing RequestType".into()));
        }

        let command = Command {
            command_uuid: Uuid::new_v4(),
            udid: request.udid,
            request_type: request.request_type,
            payload: request.payload,
            created_at: Utc::now(),
        };

        let raw = serde_json::to_vec(&command)
            .map_err(|e| ServiceError::InvalidMessage(e.to_string()))?;
        self.store
            .put(COMMANDS_BUCKET, &command.command_uuid.to_string(), &raw)?;

        info!(
            udid = %command.udid,
            command_uuid = %command.command_uuid,
            request_type = %command.request_type,
            "command created"
        );
        self.bus.publish(
            TOPIC_COMMAND_QUEUED,
            serde_json::json!({
                "udid": command.udid,
                "command_uuid": command.command_uuid,
            }),
        );
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;

    fn service() -> (CommandService, Arc<dyn Store>, Arc<PubSub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(FileStore::open(dir.path().join("mdm.db")).unwrap());
        let bus = Arc::new(PubSub::new());
        let svc = CommandService::new(store.clone(), bus.clone()).unwrap();
        (svc, store, bus, dir)
    }

    #[tokio::test]
    async fn new_command_persists_and_publishes() {
        let (svc, store, bus, _dir) = service();
        let mut rx = bus.subscribe(TOPIC_COMMAND_QUEUED);

        let command = svc
            .new_command(CommandRequest {
                udid: "udid-1".into(),
                request_type: "DeviceInformation".into(),
                payload: serde_json::json!({"Queries": ["UDID"]}),
            })
            .unwrap();

        let stored = store
            .get("commands", &command.command_uuid.to_string())
            .unwrap();
        assert!(stored.is_some());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload["udid"], "udid-1");
    }

    #[tokio::test]
    async fn command_without_request_type_is_invalid() {
        let (svc, _store, _bus, _dir) = service();

        let err = svc
            .new_command(CommandRequest {
                udid: "udid-1".into(),
                request_type: String::new(),
                payload: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMessage(_)));
    }
}
