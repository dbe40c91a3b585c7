//! Enrollment service
//!
//! Serves the enrollment profile a device installs to join this server.
//! The profile carries the push topic (which must match the topic embedded
//! in the push credential used for delivery), the checkin endpoint derived
//! from the public URL, and the SCEP payload the device uses to obtain its
//! identity certificate.

use serde::Serialize;
use tracing::info;

use super::ServiceError;

/// Produces enrollment profiles
#[derive(Debug, Clone)]
pub struct EnrollService {
    topic: String,
    ca_cert_name: String,
    scep_url: String,
    challenge: String,
    public_url: String,
    /// Placeholder for pinned-certificate deployments; empty in the
    /// default setup
    #[allow(dead_code)]
    tls_cert: String,
    scep_subject: String,
}

/// The enrollment profile handed to devices
#[derive(Debug, Serialize)]
pub struct EnrollmentProfile {
    pub payload_type: String,
    pub topic: String,
    pub checkin_url: String,
    pub server_url: String,
    pub scep: ScepPayload,
}

/// SCEP payload inside the enrollment profile
#[derive(Debug, Serialize)]
pub struct ScepPayload {
    pub url: String,
    pub challenge: String,
    pub subject: String,
    pub ca_cert_name: String,
}

impl EnrollService {
    /// Construct the service. The topic is load-bearing: an empty topic
    /// would enroll devices that can never be reached by push.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topic: impl Into<String>,
        ca_cert_name: impl Into<String>,
        scep_url: impl Into<String>,
        challenge: impl Into<String>,
        public_url: impl Into<String>,
        tls_cert: impl Into<String>,
        scep_subject: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(ServiceError::InvalidMessage(
                "enrollment requires a push topic".into(),
            ));
        }
        let service = Self {
            topic,
            ca_cert_name: ca_cert_name.into(),
            scep_url: scep_url.into(),
            challenge: challenge.into(),
            public_url: public_url.into(),
            tls_cert: tls_cert.into(),
            scep_subject: scep_subject.into(),
        };
        info!(topic = %service.topic, scep_url = %service.scep_url, "enrollment service ready");
        Ok(service)
    }

    /// Build the profile served at `/mdm/enroll`
    pub fn profile(&self) -> EnrollmentProfile {
        EnrollmentProfile {
            payload_type: "Profile Service".to_string(),
            topic: self.topic.clone(),
            checkin_url: format!("{}/mdm/checkin", self.public_url.trim_end_matches('/')),
            server_url: self.public_url.clone(),
            scep: ScepPayload {
                url: self.scep_url.clone(),
                challenge: self.challenge.clone(),
                subject: self.scep_subject.clone(),
                ca_cert_name: self.ca_cert_name.clone(),
            },
        }
    }
}
