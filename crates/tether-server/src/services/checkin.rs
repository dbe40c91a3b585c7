//! Checkin service
//!
//! Handles the MDM checkin flow: devices authenticate during enrollment,
//! report push-token updates, and check out when unenrolled. Device records
//! are persisted in the shared store and every accepted message is
//! announced on the bus.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ServiceError;
use crate::pubsub::{PubSub, TOPIC_CHECKIN, TOPIC_TOKEN_UPDATE};
use crate::storage::Store;

const DEVICES_BUCKET: &str = "devices";
const PUSH_TOKENS_BUCKET: &str = "push_tokens";

/// A checkin message from a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinMessage {
    /// `Authenticate`, `TokenUpdate`, or `CheckOut`
    pub message_type: String,
    /// Device identifier
    pub udid: String,
    /// Push topic the device will listen on (TokenUpdate)
    #[serde(default)]
    pub topic: Option<String>,
    /// Base64 push token (TokenUpdate)
    #[serde(default)]
    pub token: Option<String>,
    /// Push magic string (TokenUpdate)
    #[serde(default)]
    pub push_magic: Option<String>,
}

/// Stored device record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub udid: String,
    pub enrolled: bool,
    pub topic: Option<String>,
    pub push_magic: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Persists device state from checkin messages
#[derive(Debug)]
pub struct CheckinService {
    store: Arc<dyn Store>,
    bus: Arc<PubSub>,
}

impl CheckinService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<PubSub>) -> Result<Self, ServiceError> {
        Ok(Self { store, bus })
    }

    /// Process one checkin message
    pub fn checkin(&self, msg: CheckinMessage) -> Result<(), ServiceError> {
        if msg.udid.is_empty() {
            return Err(ServiceError::InvalidMessage("missing UDID".into()));
        }

        match msg.message_type.as_str() {
            "Authenticate" => self.authenticate(&msg),
            "TokenUpdate" => self.token_update(&msg),
            "CheckOut" => self.check_out(&msg),
            other => Err(ServiceError::InvalidMessage(format!(
                "unknown MessageType {other:?}"
            ))),
        }
    }

    fn authenticate(&self, msg: &CheckinMessage) -> Result<(), ServiceError> {
        let record = DeviceRecord {
            udid: msg.udid.clone(),
            enrolled: false,
            topic: msg.topic.clone(),
            push_magic: None,
            last_seen: Utc::now(),
        };
        self.save_device(&record)?;
        info!(udid = %msg.udid, "device authenticated");
        self.bus.publish(
            TOPIC_CHECKIN,
            serde_json::json!({"message_type": "Authenticate", "udid": msg.udid}),
        );
        Ok(())
    }

    fn token_update(&self, msg: &CheckinMessage) -> Result<(), ServiceError> {
        let token = msg
            .token
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidMessage("TokenUpdate without token".into()))?;

        let mut record = self
            .load_device(&msg.udid)?
            .unwrap_or_else(|| DeviceRecord {
                udid: msg.udid.clone(),
                enrolled: false,
                topic: None,
                push_magic: None,
                last_seen: Utc::now(),
            });
        record.enrolled = true;
        record.topic = msg.topic.clone().or(record.topic);
        record.push_magic = msg.push_magic.clone().or(record.push_magic);
        record.last_seen = Utc::now();
        self.save_device(&record)?;

        self.store
            .put(PUSH_TOKENS_BUCKET, &msg.udid, token.as_bytes())?;

        info!(udid = %msg.udid, "push token updated");
        self.bus.publish(
            TOPIC_TOKEN_UPDATE,
            serde_json::json!({"message_type": "TokenUpdate", "udid": msg.udid}),
        );
        Ok(())
    }

    fn check_out(&self, msg: &CheckinMessage) -> Result<(), ServiceError> {
        if let Some(mut record) = self.load_device(&msg.udid)? {
            record.enrolled = false;
            record.last_seen = Utc::now();
            self.save_device(&record)?;
        }
        self.store.delete(PUSH_TOKENS_BUCKET, &msg.udid)?;
        info!(udid = %msg.udid, "device checked out");
        self.bus.publish(
            TOPIC_CHECKIN,
            serde_json::json!({"message_type": "CheckOut", "udid": msg.udid}),
        );
        Ok(())
    }

    fn save_device(&self, record: &DeviceRecord) -> Result<(), ServiceError> {
        let raw = serde_json::to_vec(record)
            .map_err(|e| ServiceError::InvalidMessage(e.to_string()))?;
        self.store.put(DEVICES_BUCKET, &record.udid, &raw)?;
        Ok(())
    }

    fn load_device(&self, udid: &str) -> Result<Option<DeviceRecord>, ServiceError> {
        match self.store.get(DEVICES_BUCKET, udid)? {
            None => Ok(None),
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| ServiceError::InvalidMessage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;

    fn service() -> (CheckinService, Arc<dyn Store>, Arc<PubSub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(FileStore::open(dir.path().join("mdm.db")).unwrap());
        let bus = Arc::new(PubSub::new());
        let svc = CheckinService::new(store.clone(), bus.clone()).unwrap();
        (svc, store, bus, dir)
    }

    #[tokio::test]
    async fn authenticate_persists_device_and_publishes() {
        let (svc, store, bus, _dir) = service();
        let mut rx = bus.subscribe(TOPIC_CHECKIN);

        svc.checkin(CheckinMessage {
            message_type: "Authenticate".into(),
            udid: "udid-1".into(),
            topic: Some("com.example.push".into()),
            token: None,
            push_magic: None,
        })
        .unwrap();

        assert!(store.get("devices", "udid-1").unwrap().is_some());
        assert_eq!(rx.recv().await.unwrap().payload["udid"], "udid-1");
    }

    #[tokio::test]
    async fn token_update_records_push_token() {
        let (svc, store, _bus, _dir) = service();

        svc.checkin(CheckinMessage {
            message_type: "TokenUpdate".into(),
            udid: "udid-1".into(),
            topic: None,
            token: Some("dG9rZW4=".into()),
            push_magic: Some("magic".into()),
        })
        .unwrap();

        assert_eq!(
            store.get("push_tokens", "udid-1").unwrap().unwrap(),
            b"dG9rZW4="
        );
    }

    #[tokio::test]
    async fn token_update_without_token_is_invalid() {
        let (svc, _store, _bus, _dir) = service();

        let err = svc
            .checkin(CheckinMessage {
                message_type: "TokenUpdate".into(),
                udid: "udid-1".into(),
                topic: None,
                token: None,
                push_magic: None,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn check_out_removes_push_token() {
        let (svc, store, _bus, _dir) = service();

        svc.checkin(CheckinMessage {
            message_type: "TokenUpdate".into(),
            udid: "udid-1".into(),
            topic: None,
            token: Some("t".into()),
            push_magic: None,
        })
        .unwrap();
        svc.checkin(CheckinMessage {
            message_type: "CheckOut".into(),
            udid: "udid-1".into(),
            topic: None,
            token: None,
            push_magic: None,
        })
        .unwrap();

        assert!(store.get("push_tokens", "udid-1").unwrap().is_none());
    }
}
