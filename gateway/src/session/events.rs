//! Session data model: statuses, speakers, transcript items, and the tagged
//! event variants appended to the per-session log.
//!
//! Event JSON is the wire format delivered to viewer websockets, so the
//! shapes here are the contract with the call-panel widget: a `type` tag
//! plus camelCase fields, every event carrying `seq` and `timestamp`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lifecycle status of a call session.
///
/// `Ready` is a pseudo-status used only where no session exists yet (the
/// call-panel descriptor); sessions themselves always start at `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Ready,
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    /// Terminal statuses latch: once reached, later transitions are ignored.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ready => "ready",
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side of the call authored a transcript item or audio level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Recipient,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Recipient => "recipient",
            Speaker::Assistant => "assistant",
        }
    }
}

/// One recipient- or assistant-authored turn. `(speaker, item_id)` is the
/// identity within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptItem {
    pub item_id: String,
    pub speaker: Speaker,
    /// Accumulated (delta) or replaced (final) text.
    pub text: String,
    pub is_final: bool,
    /// Last sequence at which this item was updated.
    pub seq: u64,
    /// Position in the session's transcript order.
    pub order: u32,
    /// Wall-clock time of the last update.
    pub timestamp: u64,
}

/// Free-text context captured at session creation and interpolated into the
/// model's system prompt. Never appears in transcripts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallBrief {
    #[serde(default)]
    pub reason_summary: Option<String>,
    #[serde(default)]
    pub context_from_chat: Option<String>,
    #[serde(default)]
    pub absence_stats: Option<String>,
}

/// An event appended to a session's log. `seq` is strictly monotonic per
/// session and assigned at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub seq: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Tagged event variants observable by viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventKind {
    #[serde(rename = "status")]
    Status { status: CallStatus },

    #[serde(rename = "transcript.delta")]
    TranscriptDelta {
        item_id: String,
        speaker: Speaker,
        text_delta: String,
        order: u32,
    },

    #[serde(rename = "transcript.final")]
    TranscriptFinal {
        item_id: String,
        speaker: Speaker,
        full_text: String,
        order: u32,
    },

    #[serde(rename = "audio.level")]
    AudioLevel { speaker: Speaker, level: f32 },

    #[serde(rename = "session.end")]
    SessionEnd { reason: Option<String> },
}

/// Read-only view of a session answered by `call-status` and consumed by the
/// summary synthesizer. Transcript items are sorted by `(order, seq)`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub carrier_call_id: Option<String>,
    pub status: CallStatus,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub terminal_reason: Option<String>,
    pub last_seq: u64,
    pub transcript: Vec<TranscriptItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&CallStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Queued.is_terminal());
    }

    #[test]
    fn event_wire_shape_is_tagged_camel_case() {
        let event = SessionEvent {
            seq: 7,
            timestamp: 1_700_000_000_000,
            kind: EventKind::TranscriptDelta {
                item_id: "item_1".to_string(),
                speaker: Speaker::Recipient,
                text_delta: "Hello".to_string(),
                order: 0,
            },
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "transcript.delta");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["itemId"], "item_1");
        assert_eq!(value["textDelta"], "Hello");
        assert_eq!(value["speaker"], "recipient");
    }

    #[test]
    fn session_end_wire_shape() {
        let event = SessionEvent {
            seq: 1,
            timestamp: 0,
            kind: EventKind::SessionEnd {
                reason: Some("call completed".to_string()),
            },
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.end");
        assert_eq!(value["reason"], "call completed");
    }
}
