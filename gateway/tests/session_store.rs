//! Session store invariants observed end to end through subscriptions.

use std::sync::Arc;

use outcall_gateway::session::{
    CallBrief, CallStatus, EventKind, SessionStore, Speaker, ViewerMessage,
};

fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(5000))
}

#[tokio::test]
async fn viewer_reconnect_resumes_exactly_after_since_seq() {
    let store = store();
    let sid = store.create_session(CallBrief::default()).await;

    // First viewer sees everything from the start.
    let mut first = store.subscribe(&sid, 0).await.unwrap();
    assert_eq!(first.catchup.len(), 1); // status{queued}

    for i in 0..4 {
        store
            .append_transcript_delta(&sid, "r1", Speaker::Recipient, &format!("w{i} "), None)
            .await;
    }
    let mut seen = Vec::new();
    for _ in 0..4 {
        match first.rx.recv().await.unwrap() {
            ViewerMessage::Event(e) => seen.push(e.seq),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(seen, vec![2, 3, 4, 5]);
    drop(first);

    // Reconnect claiming seqs 1..=3 were seen: exactly 4 and 5 replay.
    let second = store.subscribe(&sid, 3).await.unwrap();
    let seqs: Vec<u64> = second.catchup.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![4, 5]);
}

#[tokio::test]
async fn catch_up_then_live_has_no_gap_or_duplicate() {
    let store = store();
    let sid = store.create_session(CallBrief::default()).await;
    for _ in 0..3 {
        store.append_audio_level(&sid, Speaker::Recipient, 0.2).await;
    }

    let mut sub = store.subscribe(&sid, 0).await.unwrap();
    let catchup_last = sub.catchup.last().unwrap().seq;

    store.append_audio_level(&sid, Speaker::Recipient, 0.9).await;
    match sub.rx.recv().await.unwrap() {
        ViewerMessage::Event(e) => assert_eq!(e.seq, catchup_last + 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn terminal_transition_drains_viewers() {
    let store = store();
    let sid = store.create_session(CallBrief::default()).await;
    let mut sub = store.subscribe(&sid, 0).await.unwrap();

    store
        .update_status(&sid, CallStatus::Completed, Some("call completed"))
        .await;

    // The status event and the session.end arrive in order, then the drain
    // closes the subscription after the grace period.
    let mut kinds = Vec::new();
    loop {
        match sub.rx.recv().await {
            Some(ViewerMessage::Event(e)) => kinds.push(e.kind.clone()),
            Some(ViewerMessage::Close) => break,
            None => break,
        }
    }
    assert!(matches!(
        kinds[0],
        EventKind::Status {
            status: CallStatus::Completed
        }
    ));
    assert!(matches!(kinds[1], EventKind::SessionEnd { .. }));
    assert_eq!(store.viewer_count(&sid).await, 0);
}

#[tokio::test]
async fn no_events_append_after_session_end() {
    let store = store();
    let sid = store.create_session(CallBrief::default()).await;
    store
        .update_status(&sid, CallStatus::Failed, Some("carrier error"))
        .await;
    let last = store.snapshot(&sid).await.unwrap().last_seq;

    store
        .append_transcript_delta(&sid, "x", Speaker::Recipient, "late", None)
        .await;
    store.append_audio_level(&sid, Speaker::Assistant, 0.5).await;
    store.update_status(&sid, CallStatus::Completed, None).await;

    assert_eq!(store.snapshot(&sid).await.unwrap().last_seq, last);
}

#[tokio::test]
async fn eviction_keeps_exactly_the_cap_newest_events() {
    let cap = 50;
    let store = Arc::new(SessionStore::new(cap));
    let sid = store.create_session(CallBrief::default()).await;
    for _ in 0..200 {
        store.append_audio_level(&sid, Speaker::Recipient, 0.3).await;
    }
    let events = store.events_since(&sid, 0).await;
    assert_eq!(events.len(), cap);
    // 201 events were appended in total; the newest cap survive.
    assert_eq!(events.last().unwrap().seq, 201);
    assert_eq!(events.first().unwrap().seq, 201 - cap as u64 + 1);
}

#[tokio::test]
async fn slow_viewer_is_terminated_not_blocking() {
    let store = store();
    let sid = store.create_session(CallBrief::default()).await;
    // Subscribe and never read: the bounded buffer fills and the store
    // drops the subscriber instead of stalling appends.
    let sub = store.subscribe(&sid, 0).await.unwrap();
    for _ in 0..400 {
        store.append_audio_level(&sid, Speaker::Recipient, 0.1).await;
    }
    assert_eq!(store.viewer_count(&sid).await, 0);
    // Appends kept assigning seqs throughout.
    assert!(store.snapshot(&sid).await.unwrap().last_seq > 300);
    drop(sub);
}
