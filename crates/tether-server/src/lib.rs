//! Tether MDM server
//!
//! This crate is the bootstrap and service-composition orchestrator for the
//! device-management server. It provisions the cryptographic identities the
//! server needs (the push credential and the enrollment certificate
//! authority), derives configuration from them, wires the subsystems into a
//! single HTTP routing surface, and runs the listener until an interrupt or
//! fatal transport error.
//!
//! ## Startup flow
//!
//! 1. [`bootstrap::Bootstrap`] runs the fail-fast pipeline: bus → storage →
//!    push credential → CA + SCEP → enroll → checkin → push → command →
//!    command queue. The first error aborts startup.
//! 2. [`api::create_router`] binds the five HTTP routes:
//!
//!    | Path                 | Method | Subsystem        |
//!    |----------------------|--------|------------------|
//!    | `/mdm/checkin`       | PUT    | checkin service  |
//!    | `/mdm/enroll`        | any    | enroll service   |
//!    | `/scep`              | any    | SCEP service     |
//!    | `/push/{device_id}`  | any    | push service     |
//!    | `/v1/commands`       | POST   | command service  |
//!
//! 3. [`shutdown::serve_until`] races the listener against the OS interrupt
//!    signal; the first event terminates the process.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod pubsub;
pub mod services;
pub mod shutdown;
pub mod storage;

pub use api::{create_router, route_table, AppState};
pub use bootstrap::{Bootstrap, BootstrapError, Composed, Pipeline};
pub use config::ServerConfig;
pub use pubsub::{Event, PubSub};
pub use shutdown::{interrupt_signal, serve_until, ShutdownEvent};
pub use storage::{FileStore, StorageError, Store};
