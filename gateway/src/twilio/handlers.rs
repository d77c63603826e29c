//! Carrier-facing HTTP endpoints: the call-control document and the status
//! callback.

use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::state::AppState;

use super::{map_carrier_status, twiml};

#[derive(Debug, Deserialize)]
pub struct SessionIdQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// `GET|POST /twilio/twiml?sessionId=<id>` — the call-control document.
/// 404 for unknown sessions; otherwise XML, uncached.
pub async fn twiml_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionIdQuery>,
) -> Result<Response, AppError> {
    if !state.sessions.exists(&query.session_id).await {
        return Err(AppError::NotFound(format!(
            "unknown session {}",
            query.session_id
        )));
    }
    debug!(session_id = %query.session_id, "serving call-control document");
    let xml = twiml::call_control_document(&state.settings.ws_base(), &query.session_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/xml; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        xml,
    )
        .into_response())
}

/// Form fields the carrier posts on status changes. Everything else in the
/// body is ignored.
#[derive(Debug, Deserialize)]
pub struct StatusCallbackBody {
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
}

/// `POST /twilio/status?sessionId=<id>` — carrier status callback.
/// 404 for unknown sessions, 204 otherwise.
pub async fn status_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionIdQuery>,
    Form(body): Form<StatusCallbackBody>,
) -> Result<StatusCode, AppError> {
    if !state.sessions.exists(&query.session_id).await {
        return Err(AppError::NotFound(format!(
            "unknown session {}",
            query.session_id
        )));
    }

    if let Some(call_sid) = body.call_sid.as_deref() {
        state
            .sessions
            .set_carrier_call_id(&query.session_id, call_sid)
            .await;
    }

    if let Some(raw_status) = body.call_status.as_deref() {
        let status = map_carrier_status(raw_status);
        info!(
            session_id = %query.session_id,
            carrier_status = raw_status,
            %status,
            "carrier status callback"
        );
        state
            .sessions
            .update_status(&query.session_id, status, None)
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}
