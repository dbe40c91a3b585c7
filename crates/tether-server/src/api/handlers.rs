//! API request handlers
//!
//! Handlers stay thin: decode the request, call the subsystem, encode the
//! reply. All domain logic lives in the services.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::error::ApiError;
use super::AppState;
use crate::services::scep::ScepResponse;
use crate::services::{CheckinMessage, CommandRequest};

/// Empty success body for checkin acknowledgements
#[derive(Serialize)]
pub struct CheckinResponse {
    pub status: String,
}

/// Device checkin endpoint
///
/// PUT /mdm/checkin
pub async fn checkin(
    State(state): State<Arc<AppState>>,
    Json(message): Json<CheckinMessage>,
) -> Result<Json<CheckinResponse>, ApiError> {
    state.checkin.checkin(message)?;
    Ok(Json(CheckinResponse {
        status: "ok".into(),
    }))
}

/// Enrollment profile endpoint
///
/// ANY /mdm/enroll
pub async fn enroll(State(state): State<Arc<AppState>>) -> Response {
    Json(state.enroll.profile()).into_response()
}

/// SCEP endpoint, dispatched on the `operation` query parameter
///
/// ANY /scep?operation=GetCACert
pub async fn scep(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let operation = params
        .get("operation")
        .ok_or_else(|| ApiError::BadRequest("missing operation parameter".into()))?;

    let response = match state.scep.operation(operation)? {
        ScepResponse::CaCert(der) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-x509-ca-cert")],
            der,
        )
            .into_response(),
        ScepResponse::Capabilities(caps) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            caps,
        )
            .into_response(),
    };
    Ok(response)
}

/// Push endpoint
///
/// ANY /push/{device_id}
pub async fn push(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Response, ApiError> {
    let result = state.push.push(&device_id)?;
    Ok(Json(result).into_response())
}

/// Command creation response
#[derive(Serialize)]
pub struct NewCommandResponse {
    pub command_uuid: String,
    pub udid: String,
}

/// Command creation endpoint
///
/// POST /v1/commands
pub async fn new_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<NewCommandResponse>), ApiError> {
    let command = state.command.new_command(request)?;
    Ok((
        StatusCode::CREATED,
        Json(NewCommandResponse {
            command_uuid: command.command_uuid.to_string(),
            udid: command.udid,
        }),
    ))
}
