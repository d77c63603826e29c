//! System prompt rendering for the model session.
//!
//! The prompt is a `{{name}}` template interpolated with the call brief and
//! the configured brief defaults. A missing template file never fails the
//! bridge; the in-code template is the fallback of last resort. Prompt
//! content is configuration, not conversation: it never reaches the
//! transcript or the viewers.

use std::collections::HashMap;

use tracing::warn;

use crate::config::Settings;
use crate::session::CallBrief;

/// Built-in prompt used when neither a template file nor
/// `OPENAI_REALTIME_SYSTEM_PROMPT` is configured.
const DEFAULT_TEMPLATE: &str = "\
You are a warm, professional assistant calling on behalf of {{school_name}} \
({{teacher_role}}). You are speaking with {{parent_name}}, {{parent_relationship}} \
of {{student_name}}, on their {{parent_number_label}} number.

Reason for the call: {{reason_summary}}

Context from the school: {{context_from_chat}}
Attendance record: {{absence_stats}}

Keep the tone supportive, never accusatory. Ask how the family is doing, \
explain the absences you are calling about, and ask whether the school can \
help with anything. Keep answers short; this is a phone call.";

/// Substitute `{{name}}` placeholders. Unknown names render as empty
/// strings; surrounding whitespace inside the braces is tolerated.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                if let Some(value) = vars.get(key) {
                    out.push_str(value);
                }
                rest = &after[close + 2..];
            }
            None => {
                // Unterminated braces: emit literally.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the interpolation map from the brief and configured defaults.
fn template_vars(settings: &Settings, brief: &CallBrief) -> HashMap<&'static str, String> {
    let defaults = &settings.brief;
    let mut vars = HashMap::new();
    vars.insert("student_name", defaults.student_name.clone());
    vars.insert("parent_name", defaults.parent_name.clone());
    vars.insert("parent_relationship", defaults.parent_relationship.clone());
    vars.insert("parent_number_label", defaults.parent_number_label.clone());
    vars.insert("school_name", defaults.school_name.clone());
    vars.insert("teacher_role", defaults.teacher_role.clone());
    vars.insert(
        "reason_summary",
        brief
            .reason_summary
            .clone()
            .unwrap_or_else(|| "a routine attendance check-in".to_string()),
    );
    vars.insert(
        "context_from_chat",
        brief.context_from_chat.clone().unwrap_or_default(),
    );
    vars.insert(
        "absence_stats",
        brief
            .absence_stats
            .clone()
            .unwrap_or_else(|| "not provided".to_string()),
    );
    vars
}

/// Render the instructions for a session's model configuration.
pub async fn build_instructions(settings: &Settings, brief: &CallBrief) -> String {
    let template = match &settings.model.prompt_template_path {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), "prompt template unreadable, using fallback: {e}");
                settings
                    .model
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
            }
        },
        None => settings
            .model
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
    };
    render(&template, &template_vars(settings, brief))
}
