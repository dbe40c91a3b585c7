//! MDM subsystems
//!
//! Each subsystem is consumed by the bootstrap pipeline through a narrow
//! construction contract (what inputs build it, what errors it can return)
//! and exposes exactly one handler surface through the route table. The
//! subsystems share the storage handle and the pub/sub bus allocated before
//! them; none may replace or close either.

pub mod checkin;
pub mod command;
pub mod enroll;
pub mod push;
pub mod queue;
pub mod scep;

pub use checkin::{CheckinMessage, CheckinService};
pub use command::{CommandRequest, CommandService};
pub use enroll::EnrollService;
pub use push::{PushClient, PushService};
pub use queue::CommandQueue;
pub use scep::{CaDepot, ScepService, ServiceOption};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by subsystem constructors and operations
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error(transparent)]
    Core(#[from] tether_core::CoreError),

    #[error("unknown device: {0}")]
    DeviceNotFound(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
