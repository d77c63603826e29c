//! Tool plane contract tests: payload shapes and the unconfigured-carrier
//! failure path.

mod common;

use serde_json::{json, Value};

use outcall_gateway::tools;

#[tokio::test]
async fn open_call_panel_descriptor_shape() {
    let state = common::test_state().await;
    let output = tools::call_tool(
        &state,
        "open-call-panel",
        json!({ "reasonSummary": "Absent 3 days this week" }),
    )
    .await
    .unwrap();

    let value = serde_json::to_value(&output).unwrap();
    let descriptor = &value["structuredContent"];
    assert_eq!(descriptor["sessionId"], Value::Null);
    assert_eq!(descriptor["status"], "ready");
    assert_eq!(descriptor["reconnectSinceSeq"], 0);
    assert_eq!(descriptor["reasonSummary"], "Absent 3 days this week");
    assert!(descriptor["logsWsUrl"]
        .as_str()
        .unwrap()
        .starts_with("ws://"));
    assert_eq!(
        value["_meta"]["outputTemplate"],
        "ui://widget/call-panel.html"
    );
}

#[tokio::test]
async fn initiate_call_without_carrier_returns_failed_result_with_token() {
    let state = common::test_state().await;
    let output = tools::call_tool(
        &state,
        "initiate-call",
        json!({ "reasonSummary": "Absent 3 days this week" }),
    )
    .await
    .unwrap();

    let value = serde_json::to_value(&output).unwrap();
    let result = &value["structuredContent"];
    assert_eq!(result["status"], "failed");
    let message = result["errorMessage"].as_str().unwrap();
    assert!(message.starts_with("Twilio is not configured"));

    // The result still carries a usable session id and viewer token.
    let session_id = result["sessionId"].as_str().unwrap();
    let token = result["viewerToken"].as_str().unwrap();
    assert!(state.sessions.exists(session_id).await);
    assert!(state.tokens.verify(session_id, token));
    assert!(!state.tokens.verify("some-other-session", token));

    // call-status reflects the terminal failure with the same reason.
    let status = tools::call_tool(&state, "call-status", json!({ "sessionId": session_id }))
        .await
        .unwrap();
    let snapshot = &serde_json::to_value(&status).unwrap()["structuredContent"];
    assert_eq!(snapshot["status"], "failed");
    assert_eq!(snapshot["terminalReason"].as_str().unwrap(), message);
}

#[tokio::test]
async fn call_status_for_unknown_session_reports_not_found() {
    let state = common::test_state().await;
    let output = tools::call_tool(&state, "call-status", json!({ "sessionId": "nope" }))
        .await
        .unwrap();
    let value = serde_json::to_value(&output).unwrap();
    assert_eq!(value["structuredContent"]["found"], false);
}

#[tokio::test]
async fn unknown_tool_is_an_error() {
    let state = common::test_state().await;
    let err = tools::call_tool(&state, "launch-missiles", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown tool"));
}

#[tokio::test]
async fn roster_crud_through_the_tool_surface() {
    let state = common::test_state().await;

    let saved = tools::call_tool(
        &state,
        "upsert-contact",
        json!({
            "studentName": "Ada",
            "parentName": "Jerry",
            "phone": "+15550100"
        }),
    )
    .await
    .unwrap();
    let contact = &serde_json::to_value(&saved).unwrap()["structuredContent"]["contact"];
    let id = contact["id"].as_i64().unwrap();
    assert_eq!(contact["relationship"], "guardian");

    let listed = tools::call_tool(&state, "list-roster", json!({})).await.unwrap();
    let contacts = &serde_json::to_value(&listed).unwrap()["structuredContent"]["contacts"];
    assert_eq!(contacts.as_array().unwrap().len(), 1);

    let removed = tools::call_tool(&state, "remove-contact", json!({ "id": id }))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&removed).unwrap()["structuredContent"]["removed"],
        true
    );
}

#[tokio::test]
async fn trends_aggregate_recorded_absences() {
    let state = common::test_state().await;
    for (date_offset, student) in [(1, "Ada"), (2, "Ada"), (3, "Ben")] {
        // Record with dates relative to today through SQLite's own clock.
        let date = sqlite_today_offset(-date_offset);
        tools::call_tool(
            &state,
            "record-absence",
            json!({ "studentName": student, "date": date }),
        )
        .await
        .unwrap();
    }

    let output = tools::call_tool(&state, "attendance-trends", json!({ "windowDays": 14 }))
        .await
        .unwrap();
    let report = &serde_json::to_value(&output).unwrap()["structuredContent"];
    assert_eq!(report["totalAbsences"], 3);
    assert_eq!(report["byStudent"]["Ada"], 2);
    assert_eq!(report["byStudent"]["Ben"], 1);

    let ada_only = tools::call_tool(
        &state,
        "attendance-trends",
        json!({ "studentName": "Ada", "windowDays": 14 }),
    )
    .await
    .unwrap();
    let report = &serde_json::to_value(&ada_only).unwrap()["structuredContent"];
    assert_eq!(report["totalAbsences"], 2);
}

#[tokio::test]
async fn record_absence_rejects_non_iso_dates() {
    let state = common::test_state().await;
    let err = tools::call_tool(
        &state,
        "record-absence",
        json!({ "studentName": "Ada", "date": "last tuesday" }),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("YYYY-MM-DD"));
}

fn sqlite_today_offset(offset: i64) -> String {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.query_row(
        "SELECT date('now', ?1)",
        rusqlite::params![format!("{offset} days")],
        |row| row.get::<_, String>(0),
    )
    .unwrap()
}
