//! Roster store and CRUD operations.
//!
//! An embedded SQLite database holding the contact roster and recorded
//! absence events. All access goes through tokio-rusqlite's background
//! thread; the handlers stay async.

use std::path::Path;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_rusqlite::Connection;

use crate::state::AppState;

use super::{ToolError, ToolOutput};

pub const ROSTER_TEMPLATE: &str = "ui://widget/roster.html";

const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    student_name  TEXT NOT NULL,
    parent_name   TEXT NOT NULL,
    relationship  TEXT NOT NULL DEFAULT 'guardian',
    phone         TEXT NOT NULL,
    number_label  TEXT NOT NULL DEFAULT 'primary contact'
);
CREATE TABLE IF NOT EXISTS absence_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    student_name  TEXT NOT NULL,
    date          TEXT NOT NULL,
    reason        TEXT
);
CREATE INDEX IF NOT EXISTS idx_absence_student ON absence_events(student_name);
CREATE INDEX IF NOT EXISTS idx_absence_date ON absence_events(date);
";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub student_name: String,
    pub parent_name: String,
    pub relationship: String,
    pub phone: String,
    pub number_label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub id: Option<i64>,
    pub student_name: String,
    pub parent_name: String,
    #[serde(default)]
    pub relationship: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub number_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceEvent {
    pub id: i64,
    pub student_name: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub reason: Option<String>,
}

/// The embedded store.
pub struct RosterStore {
    conn: Connection,
}

impl RosterStore {
    /// Open (creating directories and tables as needed). `:memory:` is
    /// honored for tests.
    pub async fn open(path: &Path) -> Result<Self, tokio_rusqlite::Error> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory().await?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }
            Connection::open(path).await?
        };
        conn.call(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        Self::open(Path::new(":memory:")).await
    }

    pub async fn list_contacts(&self) -> Result<Vec<Contact>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, student_name, parent_name, relationship, phone, number_label
                     FROM contacts ORDER BY student_name, id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(Contact {
                        id: row.get(0)?,
                        student_name: row.get(1)?,
                        parent_name: row.get(2)?,
                        relationship: row.get(3)?,
                        phone: row.get(4)?,
                        number_label: row.get(5)?,
                    })
                })?;
                let mut contacts = Vec::new();
                for row in rows {
                    contacts.push(row?);
                }
                Ok(contacts)
            })
            .await
    }

    /// Insert or, when `id` is present, update. Returns the stored row.
    pub async fn upsert_contact(
        &self,
        input: ContactInput,
    ) -> Result<Contact, tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                let relationship = input
                    .relationship
                    .unwrap_or_else(|| "guardian".to_string());
                let number_label = input
                    .number_label
                    .unwrap_or_else(|| "primary contact".to_string());
                let id = match input.id {
                    Some(id) => {
                        conn.execute(
                            "UPDATE contacts
                             SET student_name = ?1, parent_name = ?2, relationship = ?3,
                                 phone = ?4, number_label = ?5
                             WHERE id = ?6",
                            params![
                                input.student_name,
                                input.parent_name,
                                relationship,
                                input.phone,
                                number_label,
                                id
                            ],
                        )?;
                        id
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO contacts
                                 (student_name, parent_name, relationship, phone, number_label)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![
                                input.student_name,
                                input.parent_name,
                                relationship,
                                input.phone,
                                number_label
                            ],
                        )?;
                        conn.last_insert_rowid()
                    }
                };
                let contact = conn
                    .query_row(
                        "SELECT id, student_name, parent_name, relationship, phone, number_label
                         FROM contacts WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok(Contact {
                                id: row.get(0)?,
                                student_name: row.get(1)?,
                                parent_name: row.get(2)?,
                                relationship: row.get(3)?,
                                phone: row.get(4)?,
                                number_label: row.get(5)?,
                            })
                        },
                    )?;
                Ok(contact)
            })
            .await
    }

    /// Returns true when a row was deleted.
    pub async fn remove_contact(&self, id: i64) -> Result<bool, tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                let affected = conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
                Ok(affected > 0)
            })
            .await
    }

    pub async fn record_absence(
        &self,
        student_name: String,
        date: String,
        reason: Option<String>,
    ) -> Result<AbsenceEvent, tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO absence_events (student_name, date, reason)
                     VALUES (?1, ?2, ?3)",
                    params![student_name, date, reason],
                )?;
                let id = conn.last_insert_rowid();
                let event = conn.query_row(
                    "SELECT id, student_name, date, reason FROM absence_events WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(AbsenceEvent {
                            id: row.get(0)?,
                            student_name: row.get(1)?,
                            date: row.get(2)?,
                            reason: row.get(3)?,
                        })
                    },
                )?;
                Ok(event)
            })
            .await
    }

    /// Absence events within the trailing window, optionally filtered to a
    /// student. Date math stays inside SQLite.
    pub async fn absences_in_window(
        &self,
        student_name: Option<String>,
        window_days: u32,
    ) -> Result<Vec<AbsenceEvent>, tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                let cutoff = format!("-{window_days} days");
                let mut events = Vec::new();
                match student_name {
                    Some(student) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, student_name, date, reason FROM absence_events
                             WHERE date >= date('now', ?1) AND student_name = ?2
                             ORDER BY date",
                        )?;
                        let rows = stmt.query_map(params![cutoff, student], |row| {
                            Ok(AbsenceEvent {
                                id: row.get(0)?,
                                student_name: row.get(1)?,
                                date: row.get(2)?,
                                reason: row.get(3)?,
                            })
                        })?;
                        for row in rows {
                            events.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, student_name, date, reason FROM absence_events
                             WHERE date >= date('now', ?1)
                             ORDER BY date",
                        )?;
                        let rows = stmt.query_map(params![cutoff], |row| {
                            Ok(AbsenceEvent {
                                id: row.get(0)?,
                                student_name: row.get(1)?,
                                date: row.get(2)?,
                                reason: row.get(3)?,
                            })
                        })?;
                        for row in rows {
                            events.push(row?);
                        }
                    }
                }
                Ok(events)
            })
            .await
    }
}

pub fn contact_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "studentName": { "type": "string" },
            "parentName": { "type": "string" },
            "relationship": { "type": "string" },
            "phone": { "type": "string" },
            "numberLabel": { "type": "string" }
        },
        "required": ["studentName", "parentName", "phone"]
    })
}

pub async fn list_roster(state: &AppState) -> Result<ToolOutput, ToolError> {
    let contacts = state
        .roster
        .list_contacts()
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    let text = format!("{} contact(s) on the roster", contacts.len());
    Ok(ToolOutput::new(
        text,
        json!({ "contacts": contacts }),
        Some(ROSTER_TEMPLATE),
    ))
}

pub async fn upsert_contact(state: &AppState, arguments: Value) -> Result<ToolOutput, ToolError> {
    let input: ContactInput = serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    let contact = state
        .roster
        .upsert_contact(input)
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    Ok(ToolOutput::new(
        format!("Saved contact for {}", contact.student_name),
        json!({ "contact": contact }),
        Some(ROSTER_TEMPLATE),
    ))
}

pub async fn remove_contact(state: &AppState, arguments: Value) -> Result<ToolOutput, ToolError> {
    let id = arguments
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolError::InvalidArguments("missing id".to_string()))?;
    let removed = state
        .roster
        .remove_contact(id)
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    let text = if removed {
        "Contact removed"
    } else {
        "No contact with that id"
    };
    Ok(ToolOutput::new(
        text,
        json!({ "removed": removed }),
        Some(ROSTER_TEMPLATE),
    ))
}
