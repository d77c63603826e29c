//! Attendance trend analytics over recorded absence events.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

use super::roster::AbsenceEvent;
use super::{ToolError, ToolOutput};

const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub window_days: u32,
    pub total_absences: usize,
    pub by_student: BTreeMap<String, usize>,
    /// ISO weekday name → count.
    pub by_weekday: BTreeMap<String, usize>,
    /// `rising`, `falling`, or `steady`: second half of the window against
    /// the first.
    pub direction: &'static str,
}

pub fn absence_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "studentName": { "type": "string" },
            "date": { "type": "string", "description": "ISO date YYYY-MM-DD" },
            "reason": { "type": "string" }
        },
        "required": ["studentName", "date"]
    })
}

pub fn trends_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "studentName": { "type": "string" },
            "windowDays": { "type": "integer", "minimum": 1, "maximum": 365 }
        }
    })
}

pub async fn record_absence(state: &AppState, arguments: Value) -> Result<ToolOutput, ToolError> {
    let student = arguments
        .get("studentName")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("missing studentName".to_string()))?
        .to_string();
    let date = arguments
        .get("date")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("missing date".to_string()))?
        .to_string();
    if !looks_like_iso_date(&date) {
        return Err(ToolError::InvalidArguments(format!(
            "date must be YYYY-MM-DD, got '{date}'"
        )));
    }
    let reason = arguments
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    let event = state
        .roster
        .record_absence(student, date, reason)
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    Ok(ToolOutput::new(
        format!("Recorded absence for {} on {}", event.student_name, event.date),
        json!({ "event": event }),
        None,
    ))
}

pub async fn attendance_trends(
    state: &AppState,
    arguments: Value,
) -> Result<ToolOutput, ToolError> {
    let student = arguments
        .get("studentName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let window_days = arguments
        .get("windowDays")
        .and_then(Value::as_u64)
        .map(|d| d.clamp(1, 365) as u32)
        .unwrap_or(DEFAULT_WINDOW_DAYS);

    let events = state
        .roster
        .absences_in_window(student, window_days)
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    let report = aggregate(&events, window_days);
    let text = format!(
        "{} absence(s) in the last {} days ({})",
        report.total_absences, report.window_days, report.direction
    );
    Ok(ToolOutput::new(
        text,
        serde_json::to_value(&report).map_err(|e| ToolError::Internal(e.to_string()))?,
        None,
    ))
}

/// Aggregate events into the report. Events arrive sorted by date.
pub fn aggregate(events: &[AbsenceEvent], window_days: u32) -> TrendReport {
    let mut by_student: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_weekday: BTreeMap<String, usize> = BTreeMap::new();
    for event in events {
        *by_student.entry(event.student_name.clone()).or_default() += 1;
        if let Some(weekday) = weekday_name(&event.date) {
            *by_weekday.entry(weekday.to_string()).or_default() += 1;
        }
    }

    // Direction: split the observed date span at its midpoint and compare
    // how many absences fall in each half.
    let days: Vec<i64> = events.iter().filter_map(|e| day_number(&e.date)).collect();
    let direction = match (days.iter().min(), days.iter().max()) {
        (Some(&min), Some(&max)) if max > min => {
            let mid = min + (max - min) / 2;
            let early = days.iter().filter(|&&d| d <= mid).count();
            let late = days.len() - early;
            match late.cmp(&early) {
                std::cmp::Ordering::Greater => "rising",
                std::cmp::Ordering::Less => "falling",
                std::cmp::Ordering::Equal => "steady",
            }
        }
        _ => "steady",
    };

    TrendReport {
        window_days,
        total_absences: events.len(),
        by_student,
        by_weekday,
        direction,
    }
}

fn looks_like_iso_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && date
            .chars()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
}

/// Days since the civil epoch for an ISO date (Howard Hinnant's
/// days-from-civil), used to split the trend window.
fn day_number(date: &str) -> Option<i64> {
    let mut parts = date.split('-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: i64 = parts.next()?.parse().ok()?;
    let day: i64 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some(era * 146_097 + doe - 719_468)
}

/// Weekday for an ISO date via the day-count algorithm (no calendar crate).
fn weekday_name(date: &str) -> Option<&'static str> {
    let mut parts = date.split('-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: i64 = parts.next()?.parse().ok()?;
    let day: i64 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    // Zeller's congruence, Gregorian calendar.
    let (m, y) = if month < 3 {
        (month + 12, year - 1)
    } else {
        (month, year)
    };
    let k = y % 100;
    let j = y / 100;
    let h = (day + (13 * (m + 1)) / 5 + k + k / 4 + j / 4 + 5 * j) % 7;
    Some(match h {
        0 => "saturday",
        1 => "sunday",
        2 => "monday",
        3 => "tuesday",
        4 => "wednesday",
        5 => "thursday",
        _ => "friday",
    })
}
