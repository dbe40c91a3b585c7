//! HTTP routing surface
//!
//! Exactly one handler per subsystem, bound at a fixed path. The route
//! table is declared as data so its shape can be asserted independently of
//! the router; `create_router` is the single place it turns into axum
//! routes.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{any, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::bootstrap::Composed;
use crate::services::{
    CheckinService, CommandQueue, CommandService, EnrollService, PushService, ScepService,
};

pub use error::ApiError;

/// Shared handler state: one handle per subsystem
pub struct AppState {
    pub checkin: Arc<CheckinService>,
    pub enroll: Arc<EnrollService>,
    pub scep: Arc<ScepService>,
    pub push: Arc<PushService>,
    pub command: Arc<CommandService>,
    /// Held for its background consumer; no route binds it directly
    pub queue: Arc<CommandQueue>,
}

impl From<Composed> for AppState {
    fn from(composed: Composed) -> Self {
        Self {
            checkin: composed.checkin,
            enroll: composed.enroll,
            scep: composed.scep,
            push: composed.push,
            command: composed.command,
            queue: composed.queue,
        }
    }
}

/// HTTP method a route is bound under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Put,
    Post,
    /// Bound for every method
    Any,
}

/// One route binding: path, method, and the subsystem it fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteBinding {
    pub path: &'static str,
    pub method: RouteMethod,
    pub subsystem: &'static str,
}

/// The complete routing surface
pub fn route_table() -> [RouteBinding; 5] {
    [
        RouteBinding {
            path: "/mdm/checkin",
            method: RouteMethod::Put,
            subsystem: "checkin",
        },
        RouteBinding {
            path: "/mdm/enroll",
            method: RouteMethod::Any,
            subsystem: "enroll",
        },
        RouteBinding {
            path: "/scep",
            method: RouteMethod::Any,
            subsystem: "scep",
        },
        RouteBinding {
            path: "/push/{device_id}",
            method: RouteMethod::Any,
            subsystem: "push",
        },
        RouteBinding {
            path: "/v1/commands",
            method: RouteMethod::Post,
            subsystem: "command",
        },
    ]
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mdm/checkin", put(handlers::checkin))
        .route("/mdm/enroll", any(handlers::enroll))
        .route("/scep", any(handlers::scep))
        .route("/push/{device_id}", any(handlers::push))
        .route("/v1/commands", post(handlers::new_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
