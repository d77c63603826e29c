//! Remote structured summary via the model's responses endpoint.
//!
//! Requests a JSON summary constrained by a declared schema. Any failure at
//! any layer (transport, non-OK status, unparseable output, schema
//! mismatch) surfaces as an error the caller turns into the heuristic
//! fallback; nothing here is fatal to the session.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::{AttendanceRisk, CallSummary, SummarySource};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

const SYSTEM_PROMPT: &str = "You summarize a school attendance outreach call. \
Respond with JSON only, following the provided schema. Be concise and \
factual; do not invent details that are not in the transcript.";

#[derive(Debug, Error)]
pub enum RemoteSummaryError {
    #[error("summary request failed: {0}")]
    Transport(String),

    #[error("summary endpoint returned status {0}")]
    Status(u16),

    #[error("summary output unparseable: {0}")]
    Parse(String),
}

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct RemoteSummary {
    summary: String,
    key_points: Vec<String>,
    action_items: Vec<String>,
    attendance_risk: String,
}

/// Responses-API envelope, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct ResponsesEnvelope {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: Option<String>,
}

fn summary_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "key_points": { "type": "array", "items": { "type": "string" } },
            "action_items": { "type": "array", "items": { "type": "string" } },
            "attendance_risk": {
                "type": "string",
                "enum": ["low", "medium", "high", "unknown"]
            }
        },
        "required": ["summary", "key_points", "action_items", "attendance_risk"],
        "additionalProperties": false
    })
}

pub async fn synthesize(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    transcript_prompt: &str,
) -> Result<CallSummary, RemoteSummaryError> {
    let body = json!({
        "model": model,
        "input": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": transcript_prompt }
        ],
        "text": {
            "format": {
                "type": "json_schema",
                "name": "call_summary",
                "strict": true,
                "schema": summary_schema()
            }
        }
    });

    let response = http
        .post(RESPONSES_URL)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| RemoteSummaryError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RemoteSummaryError::Status(status.as_u16()));
    }

    let envelope: ResponsesEnvelope = response
        .json()
        .await
        .map_err(|e| RemoteSummaryError::Parse(e.to_string()))?;

    let text = envelope
        .output
        .iter()
        .flat_map(|item| item.content.iter())
        .find_map(|content| content.text.clone())
        .ok_or_else(|| RemoteSummaryError::Parse("no text output".to_string()))?;

    parse_summary_text(&text)
}

fn parse_summary_text(text: &str) -> Result<CallSummary, RemoteSummaryError> {
    let parsed: RemoteSummary =
        serde_json::from_str(text).map_err(|e| RemoteSummaryError::Parse(e.to_string()))?;
    let attendance_risk = match parsed.attendance_risk.as_str() {
        "low" => AttendanceRisk::Low,
        "medium" => AttendanceRisk::Medium,
        "high" => AttendanceRisk::High,
        "unknown" => AttendanceRisk::Unknown,
        other => {
            return Err(RemoteSummaryError::Parse(format!(
                "unexpected attendance_risk '{other}'"
            )))
        }
    };
    Ok(CallSummary {
        summary: parsed.summary,
        key_points: parsed.key_points,
        action_items: parsed.action_items,
        attendance_risk,
        source: SummarySource::Remote,
    })
}
