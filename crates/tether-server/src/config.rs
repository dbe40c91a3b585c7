//! Server startup parameters

use std::path::PathBuf;

/// Well-known export path for the enrollment CA certificate. Rewritten on
/// every startup so it always reflects the current authority.
pub const CA_CERT_EXPORT: &str = "SCEPCACert.pem";

/// Default path of the durable key/value store
pub const DEFAULT_STORAGE_PATH: &str = "mdm.db";

/// Default path of the push-credential archive
pub const DEFAULT_PUSH_CERT_PATH: &str = "mdm.p12";

/// Default passphrase protecting the push-credential archive
pub const DEFAULT_PUSH_CERT_PASSWORD: &str = "secret";

/// Immutable startup parameters, populated from CLI flags or environment.
///
/// This is input to the bootstrap pipeline; the pipeline threads its own
/// state by ownership and never mutates the config.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public HTTPS URL of this server, e.g. `https://mdm.example.com`.
    /// Required: the enrollment and SCEP endpoints are derived from it.
    pub public_url: String,
    /// Path to the push credential: a PKCS#12 bundle, or a certificate PEM
    /// when `push_key_path` is set
    pub push_cert_path: PathBuf,
    /// Passphrase for the PKCS#12 bundle
    pub push_cert_password: String,
    /// Optional separate private-key PEM path; switches credential loading
    /// to separate-PEM mode
    pub push_key_path: Option<PathBuf>,
    /// Path of the durable key/value store
    pub storage_path: PathBuf,
    /// SCEP enrollment challenge handed to enrolling devices (may be empty)
    pub scep_challenge: String,
}

impl ServerConfig {
    /// Config with the standard defaults for everything but the public URL
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            push_cert_path: PathBuf::from(DEFAULT_PUSH_CERT_PATH),
            push_cert_password: DEFAULT_PUSH_CERT_PASSWORD.to_string(),
            push_key_path: None,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            scep_challenge: String::new(),
        }
    }

    /// Where the enrollment CA certificate is exported: next to the store
    pub fn ca_cert_export_path(&self) -> PathBuf {
        match self.storage_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(CA_CERT_EXPORT),
            _ => PathBuf::from(CA_CERT_EXPORT),
        }
    }
}
