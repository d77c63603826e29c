//! Deterministic summary fallback.
//!
//! Builds a natural-language summary from the last recipient turns, a fixed
//! action-item baseline extended by transport/health themes, and a keyword
//! risk banding. Runs whenever the remote model is unconfigured, the
//! transcript is empty, or the remote call fails in any way.

use crate::session::{SessionSnapshot, Speaker};

use super::{AttendanceRisk, CallSummary, SummarySource};

const HIGH_RISK_KEYWORDS: &[&str] = &[
    "homeless",
    "evict",
    "unsafe",
    "hospital",
    "emergency",
    "can't make",
];

const MEDIUM_RISK_KEYWORDS: &[&str] = &[
    "sick",
    "ill",
    "doctor",
    "transport",
    "bus",
    "ride",
    "work schedule",
    "shift",
    "anxiety",
    "stressed",
    "family issue",
];

const TRANSPORT_KEYWORDS: &[&str] = &["transport", "bus", "ride", "car", "drive"];

const HEALTH_KEYWORDS: &[&str] = &["sick", "ill", "doctor", "hospital", "nurse"];

pub fn summarize(snapshot: &SessionSnapshot, contact_name: &str) -> CallSummary {
    let recipient_turns: Vec<&str> = nonempty_turns(snapshot, Speaker::Recipient);
    let assistant_turns: Vec<&str> = nonempty_turns(snapshot, Speaker::Assistant);

    let transcript_empty = recipient_turns.is_empty() && assistant_turns.is_empty();
    if transcript_empty {
        return CallSummary {
            summary: "No conversation was recorded for this call.".to_string(),
            key_points: Vec::new(),
            action_items: baseline_action_items(),
            attendance_risk: AttendanceRisk::Unknown,
            source: SummarySource::Heuristic,
        };
    }

    // Summarize from the recipient's own words when we have them.
    let quoted: Vec<&str> = if recipient_turns.is_empty() {
        last_n(&assistant_turns, 2)
    } else {
        last_n(&recipient_turns, 2)
    };
    let summary = format!("Spoke with {contact_name}. They said: {}", quoted.join(" "));

    let key_points: Vec<String> = last_n(&recipient_turns, 3)
        .iter()
        .map(|t| t.to_string())
        .collect();

    let corpus = all_text_lowercase(snapshot);
    let mut action_items = baseline_action_items();
    if contains_any(&corpus, TRANSPORT_KEYWORDS) {
        action_items
            .push("Explore bus route or ride options with the family".to_string());
    }
    if contains_any(&corpus, HEALTH_KEYWORDS) {
        action_items.push("Share school nurse and counselor contacts".to_string());
    }

    CallSummary {
        summary,
        key_points,
        action_items,
        attendance_risk: risk_band(&corpus),
        source: SummarySource::Heuristic,
    }
}

fn baseline_action_items() -> Vec<String> {
    vec![
        "Log the call outcome in the attendance system".to_string(),
        "Follow up with the family within two school days".to_string(),
    ]
}

fn risk_band(corpus: &str) -> AttendanceRisk {
    if corpus.is_empty() {
        return AttendanceRisk::Unknown;
    }
    if contains_any(corpus, HIGH_RISK_KEYWORDS) {
        AttendanceRisk::High
    } else if contains_any(corpus, MEDIUM_RISK_KEYWORDS) {
        AttendanceRisk::Medium
    } else {
        AttendanceRisk::Low
    }
}

fn contains_any(corpus: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| corpus.contains(k))
}

fn all_text_lowercase(snapshot: &SessionSnapshot) -> String {
    snapshot
        .transcript
        .iter()
        .map(|item| item.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn nonempty_turns(snapshot: &SessionSnapshot, speaker: Speaker) -> Vec<&str> {
    snapshot
        .transcript
        .iter()
        .filter(|item| item.speaker == speaker)
        .map(|item| item.text.trim())
        .filter(|text| !text.is_empty())
        .collect()
}

fn last_n<'a>(turns: &[&'a str], n: usize) -> Vec<&'a str> {
    let start = turns.len().saturating_sub(n);
    turns[start..].to_vec()
}
