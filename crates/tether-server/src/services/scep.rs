//! SCEP service and CA depot
//!
//! The depot owns the enrollment certificate authority's persistence:
//! create-or-load of the signing key and the self-signed CA certificate
//! against the shared store. Both operations are idempotent — a second
//! bootstrap over the same store returns byte-identical material.
//!
//! The service itself answers the certificate-distribution side of SCEP
//! (`GetCACert`, `GetCACaps`). The PKIOperation enrollment state machine is
//! an external concern and is answered with an explicit unsupported error.

use std::sync::Arc;

use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::X509;
use tracing::info;

use super::ServiceError;
use crate::storage::Store;
use tether_core::authority;

const CA_BUCKET: &str = "scep_ca";
const CA_KEY: &str = "key";
const CA_CERTIFICATE: &str = "certificate";

/// Default client certificate validity handed out by the SCEP endpoint
const DEFAULT_CLIENT_VALIDITY_DAYS: u32 = 365;

/// Persistence layer for the enrollment CA
#[derive(Debug, Clone)]
pub struct CaDepot {
    store: Arc<dyn Store>,
}

impl CaDepot {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Return the persisted signing key, generating and persisting a new
    /// one of the given strength when none exists yet.
    pub fn create_or_load_key(&self, bits: u32) -> Result<PKey<Private>, ServiceError> {
        if let Some(der) = self.store.get(CA_BUCKET, CA_KEY)? {
            return Ok(PKey::private_key_from_der(&der)?);
        }
        let key = authority::generate_signing_key(bits)?;
        self.store.put(CA_BUCKET, CA_KEY, &key.private_key_to_der()?)?;
        info!(bits, "generated enrollment CA signing key");
        Ok(key)
    }

    /// Return the persisted CA certificate, creating and persisting a
    /// self-signed one over `key` when none exists yet.
    pub fn create_or_load_ca(
        &self,
        key: &PKeyRef<Private>,
        validity_years: u32,
        organization: &str,
        country: &str,
    ) -> Result<X509, ServiceError> {
        if let Some(der) = self.store.get(CA_BUCKET, CA_CERTIFICATE)? {
            return Ok(X509::from_der(&der)?);
        }
        let cert =
            authority::build_ca_certificate(key, validity_years, organization, country)?;
        self.store.put(CA_BUCKET, CA_CERTIFICATE, &cert.to_der()?)?;
        info!(organization, country, validity_years, "created enrollment CA");
        Ok(cert)
    }
}

/// Construction options for [`ScepService`]
#[derive(Debug, Clone, Copy)]
pub enum ServiceOption {
    /// Validity in days of certificates issued to clients
    ClientValidity(u32),
}

/// Serves CA material over the SCEP endpoint
#[derive(Debug)]
pub struct ScepService {
    ca_certificate: X509,
    client_validity_days: u32,
}

impl ScepService {
    /// Build the service over a depot that already holds CA material
    pub fn new(
        depot: &CaDepot,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Result<Self, ServiceError> {
        let ca_certificate = depot
            .store
            .get(CA_BUCKET, CA_CERTIFICATE)?
            .ok_or_else(|| {
                ServiceError::InvalidMessage("SCEP service requires a bootstrapped CA".into())
            })
            .and_then(|der| X509::from_der(&der).map_err(ServiceError::from))?;

        let mut client_validity_days = DEFAULT_CLIENT_VALIDITY_DAYS;
        for option in options {
            match option {
                ServiceOption::ClientValidity(days) => client_validity_days = days,
            }
        }

        Ok(Self {
            ca_certificate,
            client_validity_days,
        })
    }

    /// DER encoding of the CA certificate (`GetCACert`)
    pub fn ca_certificate_der(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(self.ca_certificate.to_der()?)
    }

    /// Capabilities advertised to clients (`GetCACaps`)
    pub fn ca_capabilities(&self) -> &'static str {
        "POSTPKIOperation\nSHA-256\nAES\n"
    }

    /// Validity in days of issued client certificates
    pub fn client_validity_days(&self) -> u32 {
        self.client_validity_days
    }

    /// Dispatch a SCEP operation by name
    pub fn operation(&self, op: &str) -> Result<ScepResponse, ServiceError> {
        match op {
            "GetCACert" => Ok(ScepResponse::CaCert(self.ca_certificate_der()?)),
            "GetCACaps" => Ok(ScepResponse::Capabilities(self.ca_capabilities())),
            other => Err(ServiceError::Unsupported(format!(
                "SCEP operation {other:?}"
            ))),
        }
    }
}

/// Reply to a SCEP operation
#[derive(Debug)]
pub enum ScepResponse {
    /// DER-encoded CA certificate
    CaCert(Vec<u8>),
    /// Plain-text capability list
    Capabilities(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;

    fn depot() -> (CaDepot, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(FileStore::open(dir.path().join("mdm.db")).unwrap());
        (CaDepot::new(store), dir)
    }

    #[test]
    fn key_create_or_load_is_idempotent() {
        let (depot, _dir) = depot();

        let first = depot.create_or_load_key(2048).unwrap();
        let second = depot.create_or_load_key(2048).unwrap();

        assert_eq!(
            first.private_key_to_der().unwrap(),
            second.private_key_to_der().unwrap()
        );
    }

    #[test]
    fn ca_create_or_load_is_idempotent() {
        let (depot, _dir) = depot();
        let key = depot.create_or_load_key(2048).unwrap();

        let first = depot.create_or_load_ca(&key, 5, "Tether", "US").unwrap();
        let second = depot.create_or_load_ca(&key, 5, "Tether", "US").unwrap();

        assert_eq!(first.to_der().unwrap(), second.to_der().unwrap());
    }

    #[test]
    fn service_requires_bootstrapped_ca() {
        let (depot, _dir) = depot();
        let err = ScepService::new(&depot, []).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMessage(_)));
    }

    #[test]
    fn get_ca_cert_returns_persisted_certificate() {
        let (depot, _dir) = depot();
        let key = depot.create_or_load_key(2048).unwrap();
        let ca = depot.create_or_load_ca(&key, 5, "Tether", "US").unwrap();

        let service = ScepService::new(&depot, [ServiceOption::ClientValidity(365)]).unwrap();
        assert_eq!(service.client_validity_days(), 365);

        match service.operation("GetCACert").unwrap() {
            ScepResponse::CaCert(der) => assert_eq!(der, ca.to_der().unwrap()),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn pki_operation_is_unsupported() {
        let (depot, _dir) = depot();
        let key = depot.create_or_load_key(2048).unwrap();
        depot.create_or_load_ca(&key, 5, "Tether", "US").unwrap();

        let service = ScepService::new(&depot, []).unwrap();
        let err = service.operation("PKIOperation").unwrap_err();
        assert!(matches!(err, ServiceError::Unsupported(_)));
    }
}
