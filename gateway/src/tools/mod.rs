//! Tool plane: named operations invoked by the chat host.
//!
//! Every operation returns the same envelope: a human-readable text block,
//! machine-readable `structuredContent`, and `_meta.outputTemplate` naming
//! the widget that renders it.

pub mod panel;
pub mod roster;
pub mod trends;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::session::CallBrief;
use crate::state::AppState;
use crate::twilio;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Internal(String),
}

/// The envelope returned by every tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub content: Vec<TextContent>,
    #[serde(rename = "structuredContent")]
    pub structured_content: Value,
    #[serde(rename = "_meta", skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ToolOutput {
    pub fn new(text: impl Into<String>, structured: Value, template: Option<&str>) -> Self {
        let meta = match template {
            Some(widget) => json!({ "outputTemplate": widget }),
            None => Value::Null,
        };
        Self {
            content: vec![TextContent {
                kind: "text",
                text: text.into(),
            }],
            structured_content: structured,
            meta,
        }
    }
}

/// Tool descriptors advertised on `tools/list`.
pub fn tool_descriptors() -> Value {
    json!([
        {
            "name": "open-call-panel",
            "description": "Open the call panel widget without placing a call yet",
            "inputSchema": brief_schema(),
            "_meta": { "outputTemplate": panel::CALL_PANEL_TEMPLATE }
        },
        {
            "name": "initiate-call",
            "description": "Place an outbound call to the configured contact",
            "inputSchema": brief_schema(),
            "_meta": { "outputTemplate": panel::CALL_PANEL_TEMPLATE }
        },
        {
            "name": "call-status",
            "description": "Current status and transcript of a call session",
            "inputSchema": session_id_schema(),
            "_meta": { "outputTemplate": panel::CALL_PANEL_TEMPLATE }
        },
        {
            "name": "summarise-call",
            "description": "Structured post-call summary",
            "inputSchema": session_id_schema()
        },
        {
            "name": "list-roster",
            "description": "List roster contacts",
            "inputSchema": { "type": "object", "properties": {} },
            "_meta": { "outputTemplate": roster::ROSTER_TEMPLATE }
        },
        {
            "name": "upsert-contact",
            "description": "Create or update a roster contact",
            "inputSchema": roster::contact_schema(),
            "_meta": { "outputTemplate": roster::ROSTER_TEMPLATE }
        },
        {
            "name": "remove-contact",
            "description": "Remove a roster contact",
            "inputSchema": {
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            },
            "_meta": { "outputTemplate": roster::ROSTER_TEMPLATE }
        },
        {
            "name": "record-absence",
            "description": "Record an absence event for trend analytics",
            "inputSchema": trends::absence_schema()
        },
        {
            "name": "attendance-trends",
            "description": "Absence trend aggregates over the recorded window",
            "inputSchema": trends::trends_schema()
        }
    ])
}

fn brief_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasonSummary": { "type": "string" },
            "contextFromChat": { "type": "string" },
            "absenceStats": { "type": "string" }
        },
        "required": ["reasonSummary"]
    })
}

fn session_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "sessionId": { "type": "string" } },
        "required": ["sessionId"]
    })
}

/// Dispatch a named operation.
pub async fn call_tool(
    state: &AppState,
    name: &str,
    arguments: Value,
) -> Result<ToolOutput, ToolError> {
    match name {
        "open-call-panel" => {
            let brief = parse_brief(&arguments)?;
            Ok(panel::open_call_panel(state, brief))
        }

        "initiate-call" => {
            let brief = parse_brief(&arguments)?;
            let result = twilio::start_outbound_call(state, brief).await;
            let text = match &result.error_message {
                Some(message) => format!("Call could not be placed: {message}"),
                None => format!("Call started (session {})", result.session_id),
            };
            let structured = serde_json::to_value(&result)
                .map_err(|e| ToolError::Internal(e.to_string()))?;
            Ok(ToolOutput::new(
                text,
                structured,
                Some(panel::CALL_PANEL_TEMPLATE),
            ))
        }

        "call-status" => {
            let session_id = required_str(&arguments, "sessionId")?;
            match state.sessions.snapshot(&session_id).await {
                Some(snapshot) => {
                    let text = format!(
                        "Session {} is {} ({} transcript items)",
                        snapshot.session_id,
                        snapshot.status,
                        snapshot.transcript.len()
                    );
                    let structured = serde_json::to_value(&snapshot)
                        .map_err(|e| ToolError::Internal(e.to_string()))?;
                    Ok(ToolOutput::new(
                        text,
                        structured,
                        Some(panel::CALL_PANEL_TEMPLATE),
                    ))
                }
                None => Ok(ToolOutput::new(
                    "No such call session",
                    json!({ "found": false }),
                    Some(panel::CALL_PANEL_TEMPLATE),
                )),
            }
        }

        "summarise-call" => {
            let session_id = required_str(&arguments, "sessionId")?;
            match state.summarizer.get_summary(state, &session_id).await {
                Some(result) => {
                    let text = result.summary.summary.clone();
                    let structured = serde_json::to_value(&result)
                        .map_err(|e| ToolError::Internal(e.to_string()))?;
                    Ok(ToolOutput::new(text, structured, None))
                }
                None => Ok(ToolOutput::new(
                    "No such call session",
                    json!({ "found": false }),
                    None,
                )),
            }
        }

        "list-roster" => roster::list_roster(state).await,
        "upsert-contact" => roster::upsert_contact(state, arguments).await,
        "remove-contact" => roster::remove_contact(state, arguments).await,
        "record-absence" => trends::record_absence(state, arguments).await,
        "attendance-trends" => trends::attendance_trends(state, arguments).await,

        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn parse_brief(arguments: &Value) -> Result<CallBrief, ToolError> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn required_str(arguments: &Value, key: &str) -> Result<String, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let output = ToolOutput::new(
            "hello",
            json!({ "k": 1 }),
            Some("ui://widget/call-panel.html"),
        );
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "hello");
        assert_eq!(value["structuredContent"]["k"], 1);
        assert_eq!(value["_meta"]["outputTemplate"], "ui://widget/call-panel.html");
    }

    #[test]
    fn envelope_omits_empty_meta() {
        let output = ToolOutput::new("x", json!({}), None);
        let value = serde_json::to_value(&output).unwrap();
        assert!(value.get("_meta").is_none());
    }

    #[test]
    fn descriptors_cover_the_required_operations() {
        let descriptors = tool_descriptors();
        let names: Vec<&str> = descriptors
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        for required in [
            "open-call-panel",
            "initiate-call",
            "call-status",
            "summarise-call",
            "list-roster",
            "attendance-trends",
        ] {
            assert!(names.contains(&required), "missing {required}");
        }
    }
}
