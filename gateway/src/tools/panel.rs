//! Call-panel descriptor: what the widget renders before any session
//! exists.

use serde::Serialize;
use serde_json::json;

use crate::session::CallBrief;
use crate::state::AppState;

use super::ToolOutput;

pub const CALL_PANEL_TEMPLATE: &str = "ui://widget/call-panel.html";

/// Descriptor for a panel with no live session yet. `status` is the
/// `ready` pseudo-status; `sessionId` stays null until `initiate-call`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPanelDescriptor {
    pub session_id: Option<String>,
    pub display_number: String,
    pub student_name: String,
    pub parent_name: String,
    pub parent_relationship: String,
    pub parent_number_label: String,
    pub status: &'static str,
    pub logs_ws_url: String,
    pub reconnect_since_seq: u64,
    pub reason_summary: Option<String>,
    pub context_from_chat: Option<String>,
    pub absence_stats: Option<String>,
}

pub fn open_call_panel(state: &AppState, brief: CallBrief) -> ToolOutput {
    let settings = &state.settings;
    let descriptor = CallPanelDescriptor {
        session_id: None,
        display_number: settings
            .twilio
            .default_to_number
            .clone()
            .unwrap_or_else(|| "unconfigured".to_string()),
        student_name: settings.brief.student_name.clone(),
        parent_name: settings.brief.parent_name.clone(),
        parent_relationship: settings.brief.parent_relationship.clone(),
        parent_number_label: settings.brief.parent_number_label.clone(),
        status: "ready",
        logs_ws_url: settings.logs_ws_url(),
        reconnect_since_seq: 0,
        reason_summary: brief.reason_summary,
        context_from_chat: brief.context_from_chat,
        absence_stats: brief.absence_stats,
    };
    let text = format!(
        "Call panel ready for {} ({})",
        descriptor.parent_name, descriptor.display_number
    );
    let structured = serde_json::to_value(&descriptor).unwrap_or_else(|_| json!({}));
    ToolOutput::new(text, structured, Some(CALL_PANEL_TEMPLATE))
}
