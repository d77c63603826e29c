//! Canonical mapping from carrier call statuses to session statuses.

use crate::session::CallStatus;

/// Map a carrier status string onto the session lifecycle. Unknown strings
/// map to `Failed`.
pub fn map_carrier_status(carrier_status: &str) -> CallStatus {
    match carrier_status.to_ascii_lowercase().as_str() {
        "ringing" => CallStatus::Ringing,
        "in-progress" | "answered" => CallStatus::InProgress,
        "queued" | "initiated" | "scheduled" => CallStatus::Queued,
        "completed" => CallStatus::Completed,
        _ => CallStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_mappings() {
        assert_eq!(map_carrier_status("ringing"), CallStatus::Ringing);
        assert_eq!(map_carrier_status("in-progress"), CallStatus::InProgress);
        assert_eq!(map_carrier_status("answered"), CallStatus::InProgress);
        assert_eq!(map_carrier_status("queued"), CallStatus::Queued);
        assert_eq!(map_carrier_status("initiated"), CallStatus::Queued);
        assert_eq!(map_carrier_status("scheduled"), CallStatus::Queued);
        assert_eq!(map_carrier_status("completed"), CallStatus::Completed);
    }

    #[test]
    fn unknown_statuses_fail() {
        assert_eq!(map_carrier_status("busy"), CallStatus::Failed);
        assert_eq!(map_carrier_status("no-answer"), CallStatus::Failed);
        assert_eq!(map_carrier_status("canceled"), CallStatus::Failed);
        assert_eq!(map_carrier_status(""), CallStatus::Failed);
    }

    #[test]
    fn mapping_is_case_insensitive() {
        assert_eq!(map_carrier_status("Ringing"), CallStatus::Ringing);
        assert_eq!(map_carrier_status("COMPLETED"), CallStatus::Completed);
    }
}
