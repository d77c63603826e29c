//! Process-wide registry of call sessions.
//!
//! Every mutation of a session flows through this store so that sequence
//! numbers are assigned under a single per-session lock and broadcasts to
//! viewers observe the same order. The outer map has its own lock; holding
//! it never nests inside a session lock.
//!
//! Broadcast happens while the session lock is held, which is what makes
//! catch-up-then-live seamless: `subscribe` snapshots the catch-up window
//! and registers the live channel in the same critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{
    now_ms, CallBrief, CallStatus, EventKind, SessionEvent, SessionSnapshot, Speaker,
    TranscriptItem,
};
use super::viewer::{ViewerHandle, ViewerMessage, ViewerSubscription, VIEWER_BUFFER};

/// Grace period between `session.end` and force-closing viewer sockets, so
/// buffered writes flush.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// State owned by one call session. All access goes through the session's
/// mutex in [`SessionStore`].
struct CallSession {
    session_id: String,
    carrier_call_id: Option<String>,
    status: CallStatus,
    started_at: u64,
    ended_at: Option<u64>,
    terminal_reason: Option<String>,
    brief: CallBrief,

    /// Monotonic event ordinal; the last assigned value.
    seq: u64,
    /// Transcript items keyed by `(speaker, item_id)`.
    items: HashMap<(Speaker, String), TranscriptItem>,
    /// Display order of item ids, independent of `seq`.
    order: Vec<String>,
    /// Bounded event log, oldest first.
    event_log: VecDeque<Arc<SessionEvent>>,

    viewers: HashMap<u64, ViewerHandle>,
    next_viewer_id: u64,
}

impl CallSession {
    fn new(session_id: String, brief: CallBrief) -> Self {
        Self {
            session_id,
            carrier_call_id: None,
            status: CallStatus::Queued,
            started_at: now_ms(),
            ended_at: None,
            terminal_reason: None,
            brief,
            seq: 0,
            items: HashMap::new(),
            order: Vec::new(),
            event_log: VecDeque::new(),
            viewers: HashMap::new(),
            next_viewer_id: 1,
        }
    }

    /// Assign the next seq, append to the log (evicting FIFO past the cap),
    /// and broadcast to live viewers. Eviction never touches assigned seqs.
    fn append(&mut self, kind: EventKind, cap: usize) -> Arc<SessionEvent> {
        self.seq += 1;
        let event = Arc::new(SessionEvent {
            seq: self.seq,
            timestamp: now_ms(),
            kind,
        });
        self.event_log.push_back(event.clone());
        while self.event_log.len() > cap {
            self.event_log.pop_front();
        }

        // Non-blocking fan-out; a full or closed buffer terminates the
        // subscriber rather than blocking the session.
        let mut dead: Vec<u64> = Vec::new();
        for (id, viewer) in &self.viewers {
            if let Err(e) = viewer.tx.try_send(ViewerMessage::Event(event.clone())) {
                warn!(
                    session_id = %self.session_id,
                    viewer_id = id,
                    "dropping viewer that cannot keep up: {e}"
                );
                dead.push(*id);
            }
        }
        for id in dead {
            self.viewers.remove(&id);
        }

        event
    }

    /// Position of `item_id` in the display order, appending it when unseen.
    fn order_of(&mut self, item_id: &str) -> u32 {
        match self.order.iter().position(|id| id == item_id) {
            Some(idx) => idx as u32,
            None => {
                self.order.push(item_id.to_string());
                (self.order.len() - 1) as u32
            }
        }
    }

    /// Refresh the cached `order` field of every item after an anchored
    /// insertion shifted positions.
    fn refresh_item_orders(&mut self) {
        let positions: HashMap<&str, u32> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i as u32))
            .collect();
        for item in self.items.values_mut() {
            if let Some(pos) = positions.get(item.item_id.as_str()) {
                item.order = *pos;
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut transcript: Vec<TranscriptItem> = self.items.values().cloned().collect();
        transcript.sort_by_key(|item| (item.order, item.seq));
        SessionSnapshot {
            session_id: self.session_id.clone(),
            carrier_call_id: self.carrier_call_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            terminal_reason: self.terminal_reason.clone(),
            last_seq: self.seq,
            transcript,
        }
    }
}

/// The registry. One per process, shared through `AppState`.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<CallSession>>>>,
    /// Reverse index: carrier call id → session id.
    by_carrier_id: RwLock<HashMap<String, String>>,
    event_log_cap: usize,
}

impl SessionStore {
    pub fn new(event_log_cap: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            by_carrier_id: RwLock::new(HashMap::new()),
            event_log_cap: event_log_cap.max(1),
        }
    }

    /// Allocate a fresh session at `queued`, appending the initial status
    /// event. Returns the new session id.
    pub async fn create_session(&self, brief: CallBrief) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut session = CallSession::new(session_id.clone(), brief);
        session.append(
            EventKind::Status {
                status: CallStatus::Queued,
            },
            self.event_log_cap,
        );
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        session_id
    }

    async fn session(&self, session_id: &str) -> Option<Arc<Mutex<CallSession>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.session(session_id).await?;
        let guard = session.lock().await;
        Some(guard.snapshot())
    }

    pub async fn brief(&self, session_id: &str) -> Option<CallBrief> {
        let session = self.session(session_id).await?;
        let guard = session.lock().await;
        Some(guard.brief.clone())
    }

    /// Bind the carrier's call id. Idempotent; an older mapping for the same
    /// id is evicted from the reverse index.
    pub async fn set_carrier_call_id(&self, session_id: &str, carrier_call_id: &str) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        {
            let mut guard = session.lock().await;
            if guard.carrier_call_id.as_deref() == Some(carrier_call_id) {
                return;
            }
            guard.carrier_call_id = Some(carrier_call_id.to_string());
        }
        let mut index = self.by_carrier_id.write().await;
        index.retain(|_, sid| sid != session_id);
        index.insert(carrier_call_id.to_string(), session_id.to_string());
    }

    pub async fn session_id_by_carrier(&self, carrier_call_id: &str) -> Option<String> {
        self.by_carrier_id.read().await.get(carrier_call_id).cloned()
    }

    /// Transition the session status. No-op once terminal; appends a status
    /// event only when the status changes or a reason is supplied. Terminal
    /// transitions also append `session.end` and schedule the viewer drain.
    pub async fn update_status(
        self: &Arc<Self>,
        session_id: &str,
        status: CallStatus,
        reason: Option<&str>,
    ) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.status.is_terminal() {
            debug!(session_id, %status, "ignoring status update after terminal");
            return;
        }
        let changed = guard.status != status;
        if !changed && reason.is_none() {
            return;
        }
        guard.status = status;
        if changed || reason.is_some() {
            guard.append(EventKind::Status { status }, self.event_log_cap);
        }
        if status.is_terminal() {
            guard.ended_at = Some(now_ms());
            guard.terminal_reason = reason.map(|r| r.to_string());
            guard.append(
                EventKind::SessionEnd {
                    reason: reason.map(|r| r.to_string()),
                },
                self.event_log_cap,
            );
            let store = self.clone();
            let sid = session_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(DRAIN_GRACE).await;
                store.drain_viewers(&sid).await;
            });
        }
    }

    /// Anchor `item_id` in the display order right after `previous_item_id`
    /// when that anchor exists; otherwise append. Existing positions are
    /// never disturbed for items already placed.
    pub async fn record_transcript_order(
        &self,
        session_id: &str,
        item_id: &str,
        previous_item_id: Option<&str>,
    ) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.order.iter().any(|id| id == item_id) {
            return;
        }
        let insert_at = previous_item_id
            .and_then(|prev| guard.order.iter().position(|id| id == prev))
            .map(|idx| idx + 1);
        match insert_at {
            Some(idx) => guard.order.insert(idx, item_id.to_string()),
            None => guard.order.push(item_id.to_string()),
        }
        guard.refresh_item_orders();
    }

    /// Upsert a transcript item with a text delta and emit the delta event.
    pub async fn append_transcript_delta(
        &self,
        session_id: &str,
        item_id: &str,
        speaker: Speaker,
        text_delta: &str,
        previous_item_id: Option<&str>,
    ) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.status.is_terminal() {
            debug!(session_id, item_id, "ignoring transcript delta after terminal");
            return;
        }
        if let Some(prev) = previous_item_id {
            if !guard.order.iter().any(|id| id == item_id) {
                let insert_at = guard.order.iter().position(|id| id == prev).map(|i| i + 1);
                match insert_at {
                    Some(idx) => guard.order.insert(idx, item_id.to_string()),
                    None => guard.order.push(item_id.to_string()),
                }
                guard.refresh_item_orders();
            }
        }
        let order = guard.order_of(item_id);
        let event = guard.append(
            EventKind::TranscriptDelta {
                item_id: item_id.to_string(),
                speaker,
                text_delta: text_delta.to_string(),
                order,
            },
            self.event_log_cap,
        );
        let (seq, timestamp) = (event.seq, event.timestamp);
        let key = (speaker, item_id.to_string());
        let item = guard.items.entry(key).or_insert_with(|| TranscriptItem {
            item_id: item_id.to_string(),
            speaker,
            text: String::new(),
            is_final: false,
            seq,
            order,
            timestamp,
        });
        item.text.push_str(text_delta);
        item.is_final = false;
        item.seq = seq;
        item.order = order;
        item.timestamp = timestamp;
    }

    /// Upsert a transcript item with its final text and emit the final
    /// event. The full text replaces whatever deltas accumulated.
    pub async fn append_transcript_final(
        &self,
        session_id: &str,
        item_id: &str,
        speaker: Speaker,
        full_text: &str,
        previous_item_id: Option<&str>,
    ) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.status.is_terminal() {
            debug!(session_id, item_id, "ignoring transcript final after terminal");
            return;
        }
        if let Some(prev) = previous_item_id {
            if !guard.order.iter().any(|id| id == item_id) {
                let insert_at = guard.order.iter().position(|id| id == prev).map(|i| i + 1);
                match insert_at {
                    Some(idx) => guard.order.insert(idx, item_id.to_string()),
                    None => guard.order.push(item_id.to_string()),
                }
                guard.refresh_item_orders();
            }
        }
        let order = guard.order_of(item_id);
        let event = guard.append(
            EventKind::TranscriptFinal {
                item_id: item_id.to_string(),
                speaker,
                full_text: full_text.to_string(),
                order,
            },
            self.event_log_cap,
        );
        let (seq, timestamp) = (event.seq, event.timestamp);
        let key = (speaker, item_id.to_string());
        let item = guard.items.entry(key).or_insert_with(|| TranscriptItem {
            item_id: item_id.to_string(),
            speaker,
            text: String::new(),
            is_final: false,
            seq,
            order,
            timestamp,
        });
        item.text = full_text.to_string();
        item.is_final = true;
        item.seq = seq;
        item.order = order;
        item.timestamp = timestamp;
    }

    /// Emit an audio level sample, clamped to `[0, 1]`.
    pub async fn append_audio_level(&self, session_id: &str, speaker: Speaker, level: f32) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut guard = session.lock().await;
        if guard.status.is_terminal() {
            return;
        }
        guard.append(EventKind::AudioLevel { speaker, level }, self.event_log_cap);
    }

    /// Events with `seq > since_seq`, oldest first. Events evicted from the
    /// retention window are silently absent.
    pub async fn events_since(&self, session_id: &str, since_seq: u64) -> Vec<Arc<SessionEvent>> {
        let Some(session) = self.session(session_id).await else {
            return Vec::new();
        };
        let guard = session.lock().await;
        guard
            .event_log
            .iter()
            .filter(|e| e.seq > since_seq)
            .cloned()
            .collect()
    }

    /// Register a viewer: the catch-up window and the live channel are set
    /// up under the session lock so the stream is gapless and duplicate
    /// free. Returns `None` for unknown sessions.
    pub async fn subscribe(
        &self,
        session_id: &str,
        since_seq: u64,
    ) -> Option<ViewerSubscription> {
        let session = self.session(session_id).await?;
        let mut guard = session.lock().await;
        let catchup: Vec<Arc<SessionEvent>> = guard
            .event_log
            .iter()
            .filter(|e| e.seq > since_seq)
            .cloned()
            .collect();
        let (tx, rx) = mpsc::channel(VIEWER_BUFFER);
        let viewer_id = guard.next_viewer_id;
        guard.next_viewer_id += 1;
        guard.viewers.insert(viewer_id, ViewerHandle { tx });
        Some(ViewerSubscription {
            viewer_id,
            catchup,
            rx,
        })
    }

    pub async fn unsubscribe(&self, session_id: &str, viewer_id: u64) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        session.lock().await.viewers.remove(&viewer_id);
    }

    /// Ask every live viewer to flush and close, then forget them.
    pub async fn drain_viewers(&self, session_id: &str) {
        let Some(session) = self.session(session_id).await else {
            return;
        };
        let mut guard = session.lock().await;
        for (_, viewer) in guard.viewers.drain() {
            let _ = viewer.tx.try_send(ViewerMessage::Close);
        }
    }

    pub async fn viewer_count(&self, session_id: &str) -> usize {
        match self.session(session_id).await {
            Some(session) => session.lock().await.viewers.len(),
            None => 0,
        }
    }
}
