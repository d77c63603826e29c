//! Error types shared across the gateway.
//!
//! Per-domain thiserror enums; `anyhow` stays at the binary boundary. HTTP
//! handlers convert `AppError` into responses with user-safe bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Internal(m) => {
                tracing::error!("internal error: {m}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Failures inside the media bridge. Socket-level failures mark the session
/// failed; everything else is handled in place.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("model connect failed: {0}")]
    ModelConnect(String),

    #[error("carrier socket error: {0}")]
    CarrierSocket(String),

    #[error("no session binding within the start timeout")]
    SessionUnresolved,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Failures talking to the telephony carrier's REST API.
#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("Twilio is not configured. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_FROM_NUMBER.")]
    NotConfigured,

    #[error("carrier API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("carrier transport error: {0}")]
    Transport(String),
}
