//! Post-call summary synthesis.
//!
//! On demand, cached by the session's last event seq: a second request with
//! no intervening event returns the identical payload, and any appended
//! event invalidates the cache implicitly. The remote model is tried first
//! when configured; every remote failure falls through silently to the
//! deterministic heuristic.

pub mod heuristic;
pub mod remote;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::session::{now_ms, SessionSnapshot, Speaker};
use crate::state::AppState;

/// Attendance risk bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceRisk {
    Low,
    Medium,
    High,
    Unknown,
}

/// Where a summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Remote,
    Heuristic,
}

/// The structured summary body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub attendance_risk: AttendanceRisk,
    pub source: SummarySource,
}

/// Cached summary payload handed to the tool plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub session_id: String,
    #[serde(flatten)]
    pub summary: CallSummary,
    pub generated_at: u64,
    pub last_seq: u64,
}

/// The synthesizer and its cache. Concurrent requests for the same session
/// may race and duplicate a remote call; last write wins, which is fine
/// because both computed the same `last_seq`.
pub struct Synthesizer {
    cache: Mutex<HashMap<String, SummaryResult>>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Summarize a session. `None` when the session is unknown.
    pub async fn get_summary(&self, state: &AppState, session_id: &str) -> Option<SummaryResult> {
        let snapshot = state.sessions.snapshot(session_id).await?;

        if let Some(cached) = self.cache.lock().await.get(session_id) {
            if cached.last_seq == snapshot.last_seq {
                debug!(session_id, last_seq = cached.last_seq, "summary cache hit");
                return Some(cached.clone());
            }
        }

        let contact_name = state.settings.brief.parent_name.clone();
        let prompt = transcript_prompt(&snapshot, &contact_name);

        let summary = if state.settings.model.api_key.is_some() && !prompt.is_empty() {
            match remote::synthesize(
                &state.http,
                state.settings.model.api_key.as_deref().unwrap_or_default(),
                &state.settings.model.summary_model,
                &prompt,
            )
            .await
            {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(session_id, "remote summary failed, using heuristic: {e}");
                    heuristic::summarize(&snapshot, &contact_name)
                }
            }
        } else {
            heuristic::summarize(&snapshot, &contact_name)
        };

        let result = SummaryResult {
            session_id: session_id.to_string(),
            summary,
            generated_at: now_ms(),
            last_seq: snapshot.last_seq,
        };
        self.cache
            .lock()
            .await
            .insert(session_id.to_string(), result.clone());
        Some(result)
    }
}

/// Render the transcript as labeled turns for the remote model. Blank turns
/// are skipped; an all-blank transcript renders empty.
pub fn transcript_prompt(snapshot: &SessionSnapshot, contact_name: &str) -> String {
    let mut lines = Vec::new();
    for item in &snapshot.transcript {
        let text = item.text.trim();
        if text.is_empty() {
            continue;
        }
        let label = match item.speaker {
            Speaker::Assistant => "School Assistant",
            Speaker::Recipient => contact_name,
        };
        lines.push(format!("{label}: {text}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TranscriptItem;

    fn snapshot_with(turns: &[(Speaker, &str)]) -> SessionSnapshot {
        let transcript = turns
            .iter()
            .enumerate()
            .map(|(i, (speaker, text))| TranscriptItem {
                item_id: format!("i{i}"),
                speaker: *speaker,
                text: text.to_string(),
                is_final: true,
                seq: i as u64 + 1,
                order: i as u32,
                timestamp: 0,
            })
            .collect();
        SessionSnapshot {
            session_id: "s".to_string(),
            carrier_call_id: None,
            status: crate::session::CallStatus::Completed,
            started_at: 0,
            ended_at: None,
            terminal_reason: None,
            last_seq: turns.len() as u64,
            transcript,
        }
    }

    #[test]
    fn prompt_labels_turns_and_skips_blanks() {
        let snapshot = snapshot_with(&[
            (Speaker::Assistant, "Hello, am I speaking with Jerry?"),
            (Speaker::Recipient, "   "),
            (Speaker::Recipient, "Yes, this is Jerry."),
        ]);
        let prompt = transcript_prompt(&snapshot, "Jerry");
        assert_eq!(
            prompt,
            "School Assistant: Hello, am I speaking with Jerry?\nJerry: Yes, this is Jerry."
        );
    }

    #[test]
    fn empty_transcript_renders_empty_prompt() {
        let snapshot = snapshot_with(&[]);
        assert!(transcript_prompt(&snapshot, "Jerry").is_empty());
    }
}
