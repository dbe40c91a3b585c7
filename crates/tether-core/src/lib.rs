//! Cryptographic identity provisioning for the Tether MDM server
//!
//! This crate owns the identities the server cannot run without:
//!
//! - The **push credential**: the X.509 certificate and private key used as
//!   the outbound TLS client identity for push delivery. Loaded either from
//!   a passphrase-protected PKCS#12 bundle or from a separate certificate /
//!   private-key PEM pair ([`credential`]).
//! - The **certificate authority** material used to issue device enrollment
//!   certificates: an RSA signing key and a self-signed CA certificate
//!   ([`authority`]).
//! - The **push topic**: a string derived from the UserID attribute in the
//!   push certificate's subject, scoping which devices a notification
//!   targets ([`topic`]).
//!
//! All failures here are configuration errors and are fatal to server
//! startup; nothing in this crate retries.

pub mod authority;
pub mod credential;
pub mod error;
pub mod topic;

pub use credential::{PrivateKey, PushCredential};
pub use error::{CoreError, Result};
pub use topic::push_topic;
