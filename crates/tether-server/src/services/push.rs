//! Push-delivery service
//!
//! Resolves a device's stored push token and hands it to the push client
//! for delivery. The client owns the outbound TLS identity (the push
//! credential) and the topic derived from it; retry and backoff policy live
//! upstream of this service and are out of scope here.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use crate::pubsub::PubSub;
use crate::storage::Store;
use tether_core::PushCredential;

const PUSH_TOKENS_BUCKET: &str = "push_tokens";

/// Outbound push client, authenticated by the push credential
pub struct PushClient {
    credential: PushCredential,
    topic: String,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("topic", &self.topic)
            .finish()
    }
}

impl PushClient {
    /// Build a client from the loaded credential; derives the topic from
    /// the certificate subject
    pub fn new(credential: PushCredential) -> Result<Self, ServiceError> {
        let topic = credential.topic()?;
        Ok(Self { credential, topic })
    }

    /// Topic this client is entitled to publish on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// TLS client identity used for delivery
    pub fn credential(&self) -> &PushCredential {
        &self.credential
    }

    /// Submit one notification for the given token. Delivery transport is
    /// an external collaborator; this records the attempt and returns its
    /// id.
    fn deliver(&self, device_id: &str, _token: &[u8]) -> Uuid {
        let push_id = Uuid::new_v4();
        info!(device_id, topic = %self.topic, %push_id, "push notification submitted");
        push_id
    }
}

/// Result of a push request
#[derive(Debug, Serialize)]
pub struct PushResult {
    pub status: String,
    pub push_id: Uuid,
}

/// Sends push notifications to enrolled devices
#[derive(Debug)]
pub struct PushService {
    store: Arc<dyn Store>,
    #[allow(dead_code)]
    bus: Arc<PubSub>,
    client: PushClient,
}

impl PushService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<PubSub>, client: PushClient) -> Self {
        Self { store, bus, client }
    }

    /// Push to the device with the given identifier. Fails when the device
    /// has never reported a token.
    pub fn push(&self, device_id: &str) -> Result<PushResult, ServiceError> {
        let token = self
            .store
            .get(PUSH_TOKENS_BUCKET, device_id)?
            .ok_or_else(|| ServiceError::DeviceNotFound(device_id.to_string()))?;

        let push_id = self.client.deliver(device_id, &token);
        Ok(PushResult {
            status: "sent".to_string(),
            push_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;
    use openssl::pkcs12::Pkcs12;

    fn test_credential() -> PushCredential {
        let der = test_bundle_der("com.example.push", "secret");
        let parsed = Pkcs12::from_der(&der).unwrap().parse2("secret").unwrap();
        PushCredential {
            certificate: parsed.cert.unwrap(),
            private_key: tether_core::PrivateKey::from_pkey(parsed.pkey.unwrap()).unwrap(),
        }
    }

    /// In-memory PKCS#12 fixture with the given topic
    pub(crate) fn test_bundle_der(topic: &str, passphrase: &str) -> Vec<u8> {
        use openssl::asn1::Asn1Time;
        use openssl::hash::MessageDigest;
        use openssl::nid::Nid;
        use openssl::x509::{X509Name, X509};

        let key = tether_core::authority::generate_signing_key(2048).unwrap();

        let mut name = X509Name::builder().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "push-test").unwrap();
        name.append_entry_by_nid(Nid::USERID, topic).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        Pkcs12::builder()
            .name("push")
            .pkey(&key)
            .cert(&cert)
            .build2(passphrase)
            .unwrap()
            .to_der()
            .unwrap()
    }

    #[test]
    fn client_derives_topic_from_credential() {
        let client = PushClient::new(test_credential()).unwrap();
        assert_eq!(client.topic(), "com.example.push");
    }

    #[test]
    fn push_to_known_device_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(FileStore::open(dir.path().join("mdm.db")).unwrap());
        store.put("push_tokens", "udid-1", b"token").unwrap();

        let service = PushService::new(
            store,
            Arc::new(PubSub::new()),
            PushClient::new(test_credential()).unwrap(),
        );

        let result = service.push("udid-1").unwrap();
        assert_eq!(result.status, "sent");
    }

    #[test]
    fn push_to_unknown_device_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(FileStore::open(dir.path().join("mdm.db")).unwrap());

        let service = PushService::new(
            store,
            Arc::new(PubSub::new()),
            PushClient::new(test_credential()).unwrap(),
        );

        let err = service.push("udid-unknown").unwrap_err();
        assert!(matches!(err, ServiceError::DeviceNotFound(_)));
    }
}
