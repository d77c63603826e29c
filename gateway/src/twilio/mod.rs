//! Telephony control plane and carrier protocol types.

pub mod client;
pub mod handlers;
pub mod messages;
pub mod status;
pub mod twiml;

use serde::Serialize;
use tracing::{error, info};

use crate::session::{CallBrief, CallStatus};
use crate::state::AppState;

pub use client::CreateCallResponse;
pub use status::map_carrier_status;

/// Result of a start-call request, returned to the tool plane. Carries the
/// session id and viewer token even on failure so the widget can show the
/// failed call without a second round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStartResult {
    pub session_id: String,
    pub status: CallStatus,
    pub logs_ws_url: String,
    pub viewer_token: String,
    pub reconnect_since_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Create a session and place the outbound call through the carrier.
pub async fn start_outbound_call(state: &AppState, brief: CallBrief) -> CallStartResult {
    let session_id = state.sessions.create_session(brief).await;
    let viewer_token = state.tokens.mint(&session_id);
    let logs_ws_url = state.settings.logs_ws_url();

    let mut result = CallStartResult {
        session_id: session_id.clone(),
        status: CallStatus::Queued,
        logs_ws_url,
        viewer_token,
        reconnect_since_seq: 0,
        call_sid: None,
        error_message: None,
    };

    match client::create_call(state, &session_id).await {
        Ok(created) => {
            info!(%session_id, call_sid = %created.sid, "outbound call created");
            state
                .sessions
                .set_carrier_call_id(&session_id, &created.sid)
                .await;
            let status = map_carrier_status(&created.status);
            state
                .sessions
                .update_status(&session_id, status, None)
                .await;
            result.call_sid = Some(created.sid);
            result.status = status;
        }
        Err(e) => {
            let message = e.to_string();
            error!(%session_id, "outbound call creation failed: {message}");
            state
                .sessions
                .update_status(&session_id, CallStatus::Failed, Some(&message))
                .await;
            result.status = CallStatus::Failed;
            result.error_message = Some(message);
        }
    }

    result
}
