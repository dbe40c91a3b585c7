//! Integration tests for the bootstrap pipeline and server lifecycle
//!
//! These tests exercise the full startup path: a push credential on disk,
//! an empty store, bootstrap into a composed set of subsystems, the route
//! table, CA stability across restarts, and the serve/interrupt race.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Name, X509};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use tether_server::{
    create_router, route_table, serve_until, AppState, Bootstrap, BootstrapError, ServerConfig,
    ShutdownEvent,
};

// =============================================================================
// Test Helpers
// =============================================================================

const TOPIC: &str = "com.example.push";
const PASSPHRASE: &str = "secret";

/// Self-signed push identity with the topic in the UID subject attribute
fn push_identity(topic: &str) -> (PKey<Private>, X509) {
    let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
    let key = PKey::from_rsa(rsa).unwrap();

    let mut name = X509Name::builder().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "APSP:push-test").unwrap();
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
    (key, builder.build())
}

/// Write a PKCS#12 bundle for the identity into `dir` and return its path
fn write_bundle(dir: &Path) -> std::path::PathBuf {
    let (key, cert) = push_identity(TOPIC);
    let der = Pkcs12::builder()
        .name("push")
        .pkey(&key)
        .cert(&cert)
        .build2(PASSPHRASE)
        .unwrap()
        .to_der()
        .unwrap();
    let path = dir.join("mdm.p12");
    std::fs::write(&path, der).unwrap();
    path
}

/// Config rooted in `dir` with the standard test identity
fn test_config(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::new("https://mdm.example.com");
    config.push_cert_path = write_bundle(dir);
    config.push_cert_password = PASSPHRASE.to_string();
    config.storage_path = dir.join("mdm.db");
    config.scep_challenge = "challenge".to_string();
    config
}

// =============================================================================
// Bootstrap Tests
// =============================================================================

#[tokio::test]
async fn full_bootstrap_composes_all_subsystems() {
    let dir = tempfile::tempdir().unwrap();
    let composed = Bootstrap::run(test_config(dir.path())).unwrap();

    // The enrollment profile carries the topic from the push credential
    // and the endpoints derived from the public URL.
    let profile = composed.enroll.profile();
    assert_eq!(profile.topic, TOPIC);
    assert_eq!(profile.checkin_url, "https://mdm.example.com/mdm/checkin");
    assert_eq!(profile.scep.url, "https://mdm.example.com/scep");
    assert_eq!(profile.scep.challenge, "challenge");

    // The CA trust anchor is exported next to the store.
    let exported = dir.path().join("SCEPCACert.pem");
    assert!(exported.exists());
    let pem = std::fs::read(&exported).unwrap();
    let anchor = X509::from_pem(&pem).unwrap();

    // The SCEP endpoint serves the same certificate.
    match composed.scep.operation("GetCACert").unwrap() {
        tether_server::services::scep::ScepResponse::CaCert(der) => {
            assert_eq!(der, anchor.to_der().unwrap());
        }
        other => panic!("unexpected SCEP response: {other:?}"),
    }
}

#[tokio::test]
async fn ca_material_is_stable_across_bootstraps() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let exported = dir.path().join("SCEPCACert.pem");

    let first = Bootstrap::run(config.clone()).unwrap();
    let first_pem = std::fs::read(&exported).unwrap();
    drop(first);

    let second = Bootstrap::run(config).unwrap();
    let second_pem = std::fs::read(&exported).unwrap();
    assert_eq!(first_pem, second_pem, "restart must not rotate the CA");

    match second.scep.operation("GetCACert").unwrap() {
        tether_server::services::scep::ScepResponse::CaCert(der) => {
            assert_eq!(der, X509::from_pem(&first_pem).unwrap().to_der().unwrap());
        }
        other => panic!("unexpected SCEP response: {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_fails_without_push_credential() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.push_cert_path = dir.path().join("missing.p12");

    let err = Bootstrap::run(config).unwrap_err();
    assert!(matches!(err, BootstrapError::Credential(_)), "got {err}");
}

#[tokio::test]
async fn bootstrap_fails_on_malformed_public_url() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.public_url = "not a url".to_string();

    let err = Bootstrap::run(config).unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidPublicUrl { .. }), "got {err}");
}

// =============================================================================
// Routing and Lifecycle Tests
// =============================================================================

#[test]
fn route_table_covers_every_subsystem_once() {
    let table = route_table();
    assert_eq!(table.len(), 5);

    let mut paths: Vec<_> = table.iter().map(|r| r.path).collect();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), 5, "route paths must be unique");
}

#[tokio::test]
async fn server_answers_enroll_until_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    let composed = Bootstrap::run(test_config(dir.path())).unwrap();
    let app = create_router(Arc::new(AppState::from(composed)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let lifecycle = tokio::spawn(serve_until(listener, app, async move {
        let _ = rx.await;
        "SIGINT".to_string()
    }));

    // One plain HTTP request against the enroll endpoint.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /mdm/enroll HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains(TOPIC), "profile must carry the push topic");

    tx.send(()).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), lifecycle)
        .await
        .unwrap()
        .unwrap();
    match event {
        ShutdownEvent::Interrupt(name) => assert_eq!(name, "SIGINT"),
        other => panic!("expected interrupt, got {other}"),
    }
}
