//! Push credential loading
//!
//! The push credential is the TLS client identity used to authenticate
//! outbound notifications to the push gateway. It arrives in one of two
//! mutually exclusive formats:
//!
//! - a **combined bundle**: a single passphrase-protected PKCS#12 archive
//!   holding both the certificate and the private key, or
//! - a **separate PEM pair**: a certificate PEM file plus a PKCS#1 RSA
//!   private-key PEM file.
//!
//! Exactly one loading path runs per invocation, selected by whether a
//! separate key path was supplied. A malformed passphrase, corrupt archive,
//! or missing PEM block in either mode is a fatal configuration error.

use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::X509;

use crate::error::{CoreError, Result};
use crate::topic;

/// A private key, tagged by algorithm.
///
/// The server currently supports RSA keys only; the variant set leaves room
/// for additional algorithms without touching call sites that just need a
/// `PKeyRef`.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA private key
    Rsa(PKey<Private>),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

impl PrivateKey {
    /// Wrap a generic key handle, rejecting unsupported algorithms
    pub fn from_pkey(pkey: PKey<Private>) -> Result<Self> {
        if pkey.rsa().is_ok() {
            Ok(PrivateKey::Rsa(pkey))
        } else {
            Err(CoreError::UnsupportedKeyAlgorithm(format!(
                "{:?}",
                pkey.id()
            )))
        }
    }

    /// Wrap an RSA key
    pub fn from_rsa(rsa: Rsa<Private>) -> Result<Self> {
        Ok(PrivateKey::Rsa(PKey::from_rsa(rsa)?))
    }

    /// Borrow the underlying key handle
    pub fn as_pkey(&self) -> &PKeyRef<Private> {
        match self {
            PrivateKey::Rsa(pkey) => pkey,
        }
    }

    /// Name of the key algorithm
    pub fn algorithm(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "rsa",
        }
    }
}

/// The push credential: an X.509 certificate plus its matching private key
#[derive(Debug, Clone)]
pub struct PushCredential {
    /// The push certificate
    pub certificate: X509,
    /// The matching private key
    pub private_key: PrivateKey,
}

impl PushCredential {
    /// Load the push credential from disk.
    ///
    /// When `key_path` is `None`, `cert_path` is treated as a combined
    /// PKCS#12 bundle protected by `passphrase`. When `key_path` is given,
    /// `cert_path` is read as a certificate PEM and `key_path` as a PKCS#1
    /// RSA private-key PEM; the passphrase is unused in that mode.
    ///
    /// The loaded pair is verified to match; a certificate whose public key
    /// does not correspond to the private key is rejected.
    pub fn load(cert_path: &Path, passphrase: &str, key_path: Option<&Path>) -> Result<Self> {
        let credential = match key_path {
            None => Self::from_pkcs12_bundle(cert_path, passphrase)?,
            Some(key_path) => Self::from_pem_pair(cert_path, key_path)?,
        };
        credential.verify_pair()?;
        Ok(credential)
    }

    /// Decode a passphrase-protected PKCS#12 bundle as one unit
    fn from_pkcs12_bundle(path: &Path, passphrase: &str) -> Result<Self> {
        let der = std::fs::read(path)?;
        let bundle =
            Pkcs12::from_der(&der).map_err(|e| CoreError::Pkcs12Decode(e.to_string()))?;
        let parsed = bundle
            .parse2(passphrase)
            .map_err(|e| CoreError::Pkcs12Decode(e.to_string()))?;

        let certificate = parsed
            .cert
            .ok_or_else(|| CoreError::Pkcs12Decode("bundle holds no certificate".into()))?;
        let pkey = parsed
            .pkey
            .ok_or_else(|| CoreError::Pkcs12Decode("bundle holds no private key".into()))?;

        Ok(Self {
            certificate,
            private_key: PrivateKey::from_pkey(pkey)?,
        })
    }

    /// Read a certificate PEM file and a private-key PEM file.
    ///
    /// The certificate file is decoded first; if it holds no valid PEM
    /// block the key file is never read.
    fn from_pem_pair(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let certificate =
            X509::from_pem(&cert_pem).map_err(|_| CoreError::InvalidPem("certificate"))?;

        let key_pem = std::fs::read(key_path)?;
        let rsa =
            Rsa::private_key_from_pem(&key_pem).map_err(|_| CoreError::InvalidPem("private key"))?;

        Ok(Self {
            certificate,
            private_key: PrivateKey::from_rsa(rsa)?,
        })
    }

    /// Check that certificate and key are a matching pair.
    ///
    /// A mismatched pair would otherwise surface much later as rejected
    /// TLS handshakes at the push gateway.
    fn verify_pair(&self) -> Result<()> {
        let cert_key = self.certificate.public_key()?;
        if self.private_key.as_pkey().public_eq(&cert_key) {
            Ok(())
        } else {
            Err(CoreError::KeyMismatch)
        }
    }

    /// The push topic embedded in the certificate subject
    pub fn topic(&self) -> Result<String> {
        topic::push_topic(&self.certificate)
    }
}
