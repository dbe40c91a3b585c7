//! Fail-fast bootstrap pipeline
//!
//! Startup is a fixed, ordered sequence of initialization steps: allocate
//! the bus, open storage, load the push credential, bootstrap the
//! certificate authority and SCEP service, then construct the enroll,
//! checkin, push, and command services and the command queue. Ordering is
//! load-bearing — credential loading must precede CA bootstrap and push
//! construction, CA bootstrap must precede enrollment construction, and
//! storage must precede every subsystem.
//!
//! Each step is a function from the owned pipeline state to a `Result`,
//! composed with the short-circuiting [`Pipeline`] combinator: once a step
//! fails, no later step's body executes and the first error is the
//! pipeline's result. There is no shared mutable accumulator; state moves
//! by ownership from step to step.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::{ServerConfig, CA_CERT_EXPORT};
use crate::pubsub::PubSub;
use crate::services::{
    CaDepot, CheckinService, CommandQueue, CommandService, EnrollService, PushClient,
    PushService, ScepService, ServiceError, ServiceOption,
};
use crate::storage::{FileStore, StorageError, Store};
use tether_core::{authority, CoreError, PushCredential};

/// Organization baked into the enrollment CA identity
const CA_ORGANIZATION: &str = "Tether";

/// Country baked into the enrollment CA identity
const CA_COUNTRY: &str = "US";

/// Errors that abort startup. None are retried; the first one wins.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Credential(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid public server URL {url:?}: {reason}")]
    InvalidPublicUrl { url: String, reason: String },

    #[error("pipeline step ran before its prerequisite {0:?} was built")]
    MissingPrerequisite(&'static str),
}

/// Short-circuiting step composition.
///
/// Holds either the current pipeline state or the first error produced.
/// `then` applies a step only while no error is held; after a failure every
/// subsequent `then` is a no-op and `finish` returns the held error
/// unchanged.
pub struct Pipeline<S> {
    state: Result<S, BootstrapError>,
}

impl<S> Pipeline<S> {
    /// Start a pipeline from an initial state
    pub fn start(state: S) -> Self {
        Self { state: Ok(state) }
    }

    /// Apply a step unless an error is already held
    pub fn then(self, step: impl FnOnce(S) -> Result<S, BootstrapError>) -> Self {
        Self {
            state: self.state.and_then(step),
        }
    }

    /// Resolve to the final state or the first error
    pub fn finish(self) -> Result<S, BootstrapError> {
        self.state
    }
}

/// Pipeline state: startup parameters plus every subsystem built so far.
///
/// Fields are populated strictly in step order; steps reach prerequisites
/// through accessors that fail with [`BootstrapError::MissingPrerequisite`]
/// instead of panicking if the ordering contract is ever broken.
pub struct Bootstrap {
    config: ServerConfig,
    bus: Option<Arc<PubSub>>,
    store: Option<Arc<dyn Store>>,
    credential: Option<PushCredential>,
    scep: Option<Arc<ScepService>>,
    enroll: Option<Arc<EnrollService>>,
    checkin: Option<Arc<CheckinService>>,
    push: Option<Arc<PushService>>,
    command: Option<Arc<CommandService>>,
    queue: Option<Arc<CommandQueue>>,
}

/// Everything the route assembler and lifecycle need after a successful
/// bootstrap
#[derive(Debug)]
pub struct Composed {
    pub bus: Arc<PubSub>,
    pub store: Arc<dyn Store>,
    pub scep: Arc<ScepService>,
    pub enroll: Arc<EnrollService>,
    pub checkin: Arc<CheckinService>,
    pub push: Arc<PushService>,
    pub command: Arc<CommandService>,
    pub queue: Arc<CommandQueue>,
}

impl Bootstrap {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            bus: None,
            store: None,
            credential: None,
            scep: None,
            enroll: None,
            checkin: None,
            push: None,
            command: None,
            queue: None,
        }
    }

    /// Run the full pipeline in required order
    pub fn run(config: ServerConfig) -> Result<Composed, BootstrapError> {
        Pipeline::start(Bootstrap::new(config))
            .then(Bootstrap::allocate_bus)
            .then(Bootstrap::open_storage)
            .then(Bootstrap::load_push_credential)
            .then(Bootstrap::bootstrap_authority)
            .then(Bootstrap::build_enroll_service)
            .then(Bootstrap::build_checkin_service)
            .then(Bootstrap::build_push_service)
            .then(Bootstrap::build_command_service)
            .then(Bootstrap::build_command_queue)
            .finish()?
            .compose()
    }

    // =========================================================================
    // Prerequisite accessors
    // =========================================================================

    fn bus(&self) -> Result<&Arc<PubSub>, BootstrapError> {
        self.bus
            .as_ref()
            .ok_or(BootstrapError::MissingPrerequisite("pubsub bus"))
    }

    fn store(&self) -> Result<&Arc<dyn Store>, BootstrapError> {
        self.store
            .as_ref()
            .ok_or(BootstrapError::MissingPrerequisite("storage"))
    }

    fn credential(&self) -> Result<&PushCredential, BootstrapError> {
        self.credential
            .as_ref()
            .ok_or(BootstrapError::MissingPrerequisite("push credential"))
    }

    // =========================================================================
    // Steps, in required order
    // =========================================================================

    /// Step 1: allocate the shared publish/subscribe bus
    pub fn allocate_bus(mut self) -> Result<Self, BootstrapError> {
        self.bus = Some(Arc::new(PubSub::new()));
        Ok(self)
    }

    /// Step 2: open the shared durable store
    pub fn open_storage(mut self) -> Result<Self, BootstrapError> {
        let store = FileStore::open(&self.config.storage_path)?;
        self.store = Some(Arc::new(store));
        Ok(self)
    }

    /// Step 3: load the push credential (combined bundle or PEM pair)
    pub fn load_push_credential(mut self) -> Result<Self, BootstrapError> {
        let credential = PushCredential::load(
            &self.config.push_cert_path,
            &self.config.push_cert_password,
            self.config.push_key_path.as_deref(),
        )?;
        info!(
            cert = %self.config.push_cert_path.display(),
            separate_key = self.config.push_key_path.is_some(),
            "loaded push credential"
        );
        self.credential = Some(credential);
        Ok(self)
    }

    /// Step 4: create-or-load the enrollment CA, export its PEM, and build
    /// the SCEP service
    pub fn bootstrap_authority(mut self) -> Result<Self, BootstrapError> {
        let depot = CaDepot::new(self.store()?.clone());

        let key = depot.create_or_load_key(authority::CA_KEY_BITS)?;
        let ca_cert = depot.create_or_load_ca(
            &key,
            authority::CA_VALIDITY_YEARS,
            CA_ORGANIZATION,
            CA_COUNTRY,
        )?;

        // Refresh the exported trust anchor every run, created or loaded.
        authority::write_certificate_pem(&self.config.ca_cert_export_path(), &ca_cert)
            .map_err(BootstrapError::Credential)?;

        let scep = ScepService::new(&depot, [ServiceOption::ClientValidity(365)])?;
        self.scep = Some(Arc::new(scep));
        Ok(self)
    }

    /// Step 5: build the enrollment service from the push topic and the
    /// SCEP endpoint derived from the public URL
    pub fn build_enroll_service(mut self) -> Result<Self, BootstrapError> {
        let topic = self.credential()?.topic()?;
        let scep_url = derive_scep_url(&self.config.public_url)?;

        let enroll = EnrollService::new(
            topic,
            CA_CERT_EXPORT,
            scep_url,
            self.config.scep_challenge.clone(),
            self.config.public_url.clone(),
            // TLS certificate and SCEP subject placeholders, as in the
            // default deployment.
            "",
            "",
        )?;
        self.enroll = Some(Arc::new(enroll));
        Ok(self)
    }

    /// Step 6: build the checkin service
    pub fn build_checkin_service(mut self) -> Result<Self, BootstrapError> {
        let checkin = CheckinService::new(self.store()?.clone(), self.bus()?.clone())?;
        self.checkin = Some(Arc::new(checkin));
        Ok(self)
    }

    /// Step 7: build the push service; consumes the credential as the
    /// outbound client identity
    pub fn build_push_service(mut self) -> Result<Self, BootstrapError> {
        let store = self.store()?.clone();
        let bus = self.bus()?.clone();
        let credential = self
            .credential
            .take()
            .ok_or(BootstrapError::MissingPrerequisite("push credential"))?;
        let client = PushClient::new(credential)?;
        self.push = Some(Arc::new(PushService::new(store, bus, client)));
        Ok(self)
    }

    /// Step 8: build the command service
    pub fn build_command_service(mut self) -> Result<Self, BootstrapError> {
        let command = CommandService::new(self.store()?.clone(), self.bus()?.clone())?;
        self.command = Some(Arc::new(command));
        Ok(self)
    }

    /// Step 9: start the command-delivery queue
    pub fn build_command_queue(mut self) -> Result<Self, BootstrapError> {
        let queue = CommandQueue::new(self.store()?.clone(), self.bus()?.clone())?;
        self.queue = Some(Arc::new(queue));
        Ok(self)
    }

    /// Collect the built subsystems; fails if any step was skipped
    fn compose(self) -> Result<Composed, BootstrapError> {
        Ok(Composed {
            bus: self
                .bus
                .ok_or(BootstrapError::MissingPrerequisite("pubsub bus"))?,
            store: self
                .store
                .ok_or(BootstrapError::MissingPrerequisite("storage"))?,
            scep: self
                .scep
                .ok_or(BootstrapError::MissingPrerequisite("scep service"))?,
            enroll: self
                .enroll
                .ok_or(BootstrapError::MissingPrerequisite("enroll service"))?,
            checkin: self
                .checkin
                .ok_or(BootstrapError::MissingPrerequisite("checkin service"))?,
            push: self
                .push
                .ok_or(BootstrapError::MissingPrerequisite("push service"))?,
            command: self
                .command
                .ok_or(BootstrapError::MissingPrerequisite("command service"))?,
            queue: self
                .queue
                .ok_or(BootstrapError::MissingPrerequisite("command queue"))?,
        })
    }
}

/// Derive the SCEP remote endpoint from the public server URL: the host
/// (without any port) over HTTPS at `/scep`. A URL that does not parse, or
/// parses without a host, fails the pipeline.
fn derive_scep_url(public_url: &str) -> Result<String, BootstrapError> {
    let parsed = Url::parse(public_url).map_err(|e| BootstrapError::InvalidPublicUrl {
        url: public_url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| BootstrapError::InvalidPublicUrl {
            url: public_url.to_string(),
            reason: "missing host".to_string(),
        })?;
    Ok(format!("https://{host}/scep"))
}
