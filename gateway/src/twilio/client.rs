//! Carrier REST client: outbound call creation.

use serde::Deserialize;

use crate::errors::CarrierError;
use crate::state::AppState;

/// Carrier REST API base.
const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Subset of the carrier's create-call response the gateway uses.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCallResponse {
    pub sid: String,
    pub status: String,
}

/// Error body the carrier returns on non-success responses.
#[derive(Debug, Deserialize)]
struct CarrierErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Place the outbound call for a session. The call-control document URL and
/// the status callback both carry the session id so later carrier traffic
/// resolves back to the session.
pub async fn create_call(
    state: &AppState,
    session_id: &str,
) -> Result<CreateCallResponse, CarrierError> {
    let twilio = &state.settings.twilio;
    if !twilio.is_configured() {
        return Err(CarrierError::NotConfigured);
    }
    // is_configured() guarantees these.
    let account_sid = twilio.account_sid.as_deref().unwrap_or_default();
    let auth_token = twilio.auth_token.as_deref().unwrap_or_default();
    let from = twilio.from_number.as_deref().unwrap_or_default();
    let to = twilio
        .default_to_number
        .as_deref()
        .ok_or_else(|| CarrierError::Api {
            status: 0,
            message: "no callee number configured (TWILIO_TO_NUMBER_DEFAULT)".to_string(),
        })?;

    let base = &state.settings.public_url;
    let twiml_url = format!("{base}/twilio/twiml?sessionId={session_id}");
    let status_url = format!("{base}/twilio/status?sessionId={session_id}");

    let form: Vec<(&str, &str)> = vec![
        ("To", to),
        ("From", from),
        ("Url", &twiml_url),
        ("Method", "POST"),
        ("StatusCallback", &status_url),
        ("StatusCallbackMethod", "POST"),
        ("StatusCallbackEvent", "initiated"),
        ("StatusCallbackEvent", "ringing"),
        ("StatusCallbackEvent", "answered"),
        ("StatusCallbackEvent", "completed"),
    ];

    let url = format!("{TWILIO_API_BASE}/Accounts/{account_sid}/Calls.json");
    let response = state
        .http
        .post(&url)
        .basic_auth(account_sid, Some(auth_token))
        .form(&form)
        .send()
        .await
        .map_err(|e| CarrierError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<CarrierErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("create call returned {status}"));
        return Err(CarrierError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<CreateCallResponse>()
        .await
        .map_err(|e| CarrierError::Transport(format!("invalid create-call response: {e}")))
}
