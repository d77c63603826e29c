//! Bridge protocol core.
//!
//! Translates carrier frames and model events into session-store mutations
//! and outbound frames on the opposite leg. Owns the barge-in state: the
//! active playback tracker, the pending interruption-control event ids, and
//! the recoverable-error classification that keeps a cancel/truncate race
//! from failing the call.

use std::collections::HashSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::{frame_level, pcmu_bytes_to_ms};
use crate::model::messages::{ClientEvent, ModelApiError, ServerEvent};
use crate::session::{CallStatus, SessionStore, Speaker};
use crate::twilio::messages::{CarrierFrame, CarrierOutFrame};

/// Model error codes that signal a lost race with natural turn end rather
/// than a real failure.
const RECOVERABLE_ERROR_CODES: &[&str] = &[
    "response_cancel_not_active",
    "conversation_item_not_found",
    "conversation_item_already_completed",
];

/// Bridge lifecycle. `Closing` is entered on either side's close or error,
/// or on carrier `stop`; the handler finishes the teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    AwaitingStart,
    Bound,
    Active,
    Closing,
    Closed,
}

/// What the caller should do after the core processed an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeFlow {
    Continue,
    /// Stop pumping; the session's terminal status is already recorded.
    Shutdown,
}

/// Messages to the carrier sender task, which owns the carrier sink.
#[derive(Debug)]
pub enum CarrierSend {
    Frame(CarrierOutFrame),
    /// Close the socket and end the sender task.
    Close,
}

/// Messages to the model sender task, which owns the model sink.
#[derive(Debug)]
pub enum ModelSend {
    Event(ClientEvent),
    Pong(Vec<u8>),
    /// Close the socket and end the sender task.
    Close,
}

/// Assistant audio currently being played toward the recipient.
struct ActivePlayback {
    item_id: String,
    content_index: u32,
    /// Milliseconds of audio dispatched to the carrier for this item.
    sent_ms: u64,
    /// When the first delta of this item was forwarded.
    started_at: Instant,
}

pub struct BridgeCore {
    session_id: String,
    stream_sid: Option<String>,
    state: BridgeState,

    store: Arc<SessionStore>,
    carrier_tx: mpsc::Sender<CarrierSend>,
    model_tx: mpsc::Sender<ModelSend>,

    playback: Option<ActivePlayback>,
    active_response_id: Option<String>,
    /// Event ids of interruption controls awaiting a possible error reply.
    pending_interrupts: HashSet<String>,
    next_control_id: u64,

    recipient_frames: u64,
    assistant_frames: u64,
    level_stride: u64,
    level_gain: f32,
}

impl BridgeCore {
    pub fn new(
        session_id: String,
        store: Arc<SessionStore>,
        carrier_tx: mpsc::Sender<CarrierSend>,
        model_tx: mpsc::Sender<ModelSend>,
        level_stride: u32,
        level_gain: f32,
    ) -> Self {
        Self {
            session_id,
            stream_sid: None,
            state: BridgeState::Bound,
            store,
            carrier_tx,
            model_tx,
            playback: None,
            active_response_id: None,
            pending_interrupts: HashSet::new(),
            next_control_id: 0,
            recipient_frames: 0,
            assistant_frames: 0,
            level_stride: level_stride.max(1) as u64,
            level_gain,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The model socket is open and configured; media may flow.
    pub fn mark_active(&mut self) {
        if self.state == BridgeState::Bound {
            self.state = BridgeState::Active;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = BridgeState::Closed;
    }

    /// Process one frame from the carrier leg.
    pub async fn handle_carrier_frame(&mut self, frame: CarrierFrame) -> BridgeFlow {
        match frame {
            CarrierFrame::Start { stream_sid, start } => {
                let payload = start.unwrap_or_default();
                if let Some(sid) = payload.stream_sid.or(stream_sid) {
                    self.stream_sid = Some(sid);
                }
                if let Some(call_sid) = payload.call_sid.as_deref() {
                    self.store
                        .set_carrier_call_id(&self.session_id, call_sid)
                        .await;
                }
                self.store
                    .update_status(&self.session_id, CallStatus::InProgress, None)
                    .await;
                BridgeFlow::Continue
            }

            CarrierFrame::Media { media } => {
                let Some(media) = media else {
                    return BridgeFlow::Continue;
                };
                if media.payload.is_empty() {
                    return BridgeFlow::Continue;
                }
                // Forward verbatim; the model speaks the same µ-law encoding.
                if self
                    .model_tx
                    .send(ModelSend::Event(ClientEvent::audio_append_b64(
                        &media.payload,
                    )))
                    .await
                    .is_err()
                {
                    warn!(session_id = %self.session_id, "model leg gone, dropping carrier media");
                    self.state = BridgeState::Closing;
                    return BridgeFlow::Shutdown;
                }
                self.recipient_frames += 1;
                if self.recipient_frames % self.level_stride == 0 {
                    if let Ok(bytes) = BASE64_STANDARD.decode(&media.payload) {
                        let level = frame_level(&bytes, self.level_gain);
                        self.store
                            .append_audio_level(&self.session_id, Speaker::Recipient, level)
                            .await;
                    }
                }
                BridgeFlow::Continue
            }

            CarrierFrame::Stop { stop } => {
                let reason = stop
                    .and_then(|s| s.reason)
                    .unwrap_or_else(|| "call completed".to_string());
                self.store
                    .update_status(&self.session_id, CallStatus::Completed, Some(&reason))
                    .await;
                self.state = BridgeState::Closing;
                BridgeFlow::Shutdown
            }

            CarrierFrame::Connected {} | CarrierFrame::Mark {} | CarrierFrame::Dtmf {} => {
                BridgeFlow::Continue
            }

            CarrierFrame::Unrecognized => {
                debug!(session_id = %self.session_id, "ignoring unrecognized carrier frame");
                BridgeFlow::Continue
            }
        }
    }

    /// Process one event from the model leg.
    pub async fn handle_model_event(&mut self, event: ServerEvent) -> BridgeFlow {
        match event {
            ServerEvent::Error { error } => {
                if self.is_recoverable(&error) {
                    warn!(
                        session_id = %self.session_id,
                        code = error.code.as_deref().unwrap_or("-"),
                        "recoverable interruption-control error: {}",
                        error.message_or_default()
                    );
                    return BridgeFlow::Continue;
                }
                let message = error.message_or_default();
                self.store
                    .update_status(&self.session_id, CallStatus::Failed, Some(&message))
                    .await;
                self.state = BridgeState::Closing;
                BridgeFlow::Shutdown
            }

            ServerEvent::SpeechStarted { .. } => {
                self.barge_in().await;
                BridgeFlow::Continue
            }

            ServerEvent::InputAudioBufferCommitted {
                previous_item_id,
                item_id,
            } => {
                self.store
                    .record_transcript_order(
                        &self.session_id,
                        &item_id,
                        previous_item_id.as_deref(),
                    )
                    .await;
                BridgeFlow::Continue
            }

            ServerEvent::InputTranscriptionDelta { item_id, delta } => {
                if let Some(delta) = delta {
                    self.store
                        .append_transcript_delta(
                            &self.session_id,
                            &item_id,
                            Speaker::Recipient,
                            &delta,
                            None,
                        )
                        .await;
                }
                BridgeFlow::Continue
            }

            ServerEvent::InputTranscriptionCompleted {
                item_id,
                transcript,
            } => {
                self.store
                    .append_transcript_final(
                        &self.session_id,
                        &item_id,
                        Speaker::Recipient,
                        transcript.as_deref().unwrap_or_default(),
                        None,
                    )
                    .await;
                BridgeFlow::Continue
            }

            ServerEvent::OutputTranscriptDelta { item_id, delta } => {
                if let Some(delta) = delta {
                    self.store
                        .append_transcript_delta(
                            &self.session_id,
                            &item_id,
                            Speaker::Assistant,
                            &delta,
                            None,
                        )
                        .await;
                }
                BridgeFlow::Continue
            }

            ServerEvent::OutputTranscriptDone {
                item_id,
                transcript,
            } => {
                self.store
                    .append_transcript_final(
                        &self.session_id,
                        &item_id,
                        Speaker::Assistant,
                        transcript.as_deref().unwrap_or_default(),
                        None,
                    )
                    .await;
                BridgeFlow::Continue
            }

            ServerEvent::OutputAudioDelta {
                response_id,
                item_id,
                content_index,
                delta,
            } => {
                self.forward_assistant_audio(response_id, item_id, content_index, delta)
                    .await
            }

            ServerEvent::ResponseCreated { response } => {
                self.active_response_id = response.and_then(|r| r.id);
                BridgeFlow::Continue
            }

            ServerEvent::ResponseDone { .. } => {
                // Natural turn end: nothing left to interrupt.
                self.active_response_id = None;
                self.playback = None;
                BridgeFlow::Continue
            }

            ServerEvent::SessionCreated {}
            | ServerEvent::SessionUpdated {}
            | ServerEvent::SpeechStopped { .. } => BridgeFlow::Continue,

            ServerEvent::Unrecognized => {
                debug!(session_id = %self.session_id, "ignoring unrecognized model event");
                BridgeFlow::Continue
            }
        }
    }

    async fn forward_assistant_audio(
        &mut self,
        response_id: Option<String>,
        item_id: String,
        content_index: u32,
        delta: String,
    ) -> BridgeFlow {
        let Some(stream_sid) = self.stream_sid.clone() else {
            debug!(session_id = %self.session_id, "assistant audio before carrier start, dropping");
            return BridgeFlow::Continue;
        };
        if self
            .carrier_tx
            .send(CarrierSend::Frame(CarrierOutFrame::media(
                &stream_sid,
                &delta,
            )))
            .await
            .is_err()
        {
            warn!(session_id = %self.session_id, "carrier leg gone, dropping assistant audio");
            self.state = BridgeState::Closing;
            return BridgeFlow::Shutdown;
        }

        let bytes = BASE64_STANDARD.decode(&delta).unwrap_or_default();
        let chunk_ms = pcmu_bytes_to_ms(bytes.len());
        if let Some(response_id) = response_id {
            self.active_response_id = Some(response_id);
        }
        match self.playback.as_mut() {
            Some(playback) if playback.item_id == item_id => {
                playback.sent_ms += chunk_ms;
                playback.content_index = content_index;
            }
            _ => {
                self.playback = Some(ActivePlayback {
                    item_id,
                    content_index,
                    sent_ms: chunk_ms,
                    started_at: Instant::now(),
                });
            }
        }

        self.assistant_frames += 1;
        if self.assistant_frames % self.level_stride == 0 && !bytes.is_empty() {
            let level = frame_level(&bytes, self.level_gain);
            self.store
                .append_audio_level(&self.session_id, Speaker::Assistant, level)
                .await;
        }
        BridgeFlow::Continue
    }

    /// The recipient started speaking over assistant playback: discard
    /// queued carrier audio, cancel the in-flight response, and truncate the
    /// assistant item to what was plausibly heard. A second trigger with no
    /// active output is a no-op.
    async fn barge_in(&mut self) {
        if self.playback.is_none() && self.active_response_id.is_none() {
            return;
        }

        if let Some(stream_sid) = self.stream_sid.clone() {
            let _ = self
                .carrier_tx
                .send(CarrierSend::Frame(CarrierOutFrame::clear(&stream_sid)))
                .await;
        }

        if self.active_response_id.take().is_some() {
            let event_id = self.next_control_id();
            self.pending_interrupts.insert(event_id.clone());
            let _ = self
                .model_tx
                .send(ModelSend::Event(ClientEvent::ResponseCancel {
                    event_id: Some(event_id),
                }))
                .await;
        }

        if let Some(playback) = self.playback.take() {
            if playback.sent_ms > 0 {
                let elapsed_ms = playback.started_at.elapsed().as_millis() as u64;
                let audio_end_ms = playback.sent_ms.min(elapsed_ms);
                let event_id = self.next_control_id();
                self.pending_interrupts.insert(event_id.clone());
                let _ = self
                    .model_tx
                    .send(ModelSend::Event(ClientEvent::ConversationItemTruncate {
                        event_id: Some(event_id),
                        item_id: playback.item_id,
                        content_index: playback.content_index,
                        audio_end_ms,
                    }))
                    .await;
            }
        }
    }

    /// An error is recoverable when it answers one of our interruption
    /// controls or names a race with natural turn end.
    fn is_recoverable(&mut self, error: &ModelApiError) -> bool {
        if let Some(event_id) = error.event_id.as_deref() {
            if self.pending_interrupts.remove(event_id) {
                return true;
            }
        }
        if let Some(code) = error.code.as_deref() {
            if RECOVERABLE_ERROR_CODES.contains(&code) {
                return true;
            }
        }
        let message = error.message.as_deref().unwrap_or_default().to_lowercase();
        message.contains("cancel") || message.contains("truncate")
    }

    fn next_control_id(&mut self) -> String {
        self.next_control_id += 1;
        format!("ctl_{}_{}", self.session_id, self.next_control_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CallBrief, EventKind};
    use crate::twilio::messages::{MediaPayload, StartPayload, StopPayload};

    struct Harness {
        core: BridgeCore,
        store: Arc<SessionStore>,
        session_id: String,
        carrier_rx: mpsc::Receiver<CarrierSend>,
        model_rx: mpsc::Receiver<ModelSend>,
    }

    impl Harness {
        /// Next outbound carrier frame, if any.
        fn try_carrier_frame(&mut self) -> Option<CarrierOutFrame> {
            match self.carrier_rx.try_recv() {
                Ok(CarrierSend::Frame(frame)) => Some(frame),
                _ => None,
            }
        }

        /// Next outbound model event, if any.
        fn try_model_event(&mut self) -> Option<ClientEvent> {
            match self.model_rx.try_recv() {
                Ok(ModelSend::Event(event)) => Some(event),
                _ => None,
            }
        }
    }

    async fn harness() -> Harness {
        let store = Arc::new(SessionStore::new(5000));
        let session_id = store.create_session(CallBrief::default()).await;
        let (carrier_tx, carrier_rx) = mpsc::channel(64);
        let (model_tx, model_rx) = mpsc::channel(64);
        let core = BridgeCore::new(
            session_id.clone(),
            store.clone(),
            carrier_tx,
            model_tx,
            8,
            3.4,
        );
        Harness {
            core,
            store,
            session_id,
            carrier_rx,
            model_rx,
        }
    }

    fn start_frame(stream_sid: &str, call_sid: &str) -> CarrierFrame {
        CarrierFrame::Start {
            stream_sid: Some(stream_sid.to_string()),
            start: Some(StartPayload {
                stream_sid: Some(stream_sid.to_string()),
                call_sid: Some(call_sid.to_string()),
                custom_parameters: Default::default(),
            }),
        }
    }

    fn audio_delta(item: &str, bytes: usize) -> ServerEvent {
        ServerEvent::OutputAudioDelta {
            response_id: Some("resp_1".to_string()),
            item_id: item.to_string(),
            content_index: 0,
            delta: BASE64_STANDARD.encode(vec![0xFFu8; bytes]),
        }
    }

    #[tokio::test]
    async fn start_binds_call_sid_and_marks_in_progress() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::InProgress);
        assert_eq!(snapshot.carrier_call_id.as_deref(), Some("CA1"));
        assert_eq!(
            h.store.session_id_by_carrier("CA1").await,
            Some(h.session_id.clone())
        );
    }

    #[tokio::test]
    async fn carrier_media_is_forwarded_verbatim() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let payload = BASE64_STANDARD.encode([0xFFu8; 160]);
        h.core
            .handle_carrier_frame(CarrierFrame::Media {
                media: Some(MediaPayload {
                    track: Some("inbound".to_string()),
                    payload: payload.clone(),
                }),
            })
            .await;
        match h.model_rx.recv().await.unwrap() {
            ModelSend::Event(ClientEvent::InputAudioBufferAppend { audio }) => {
                assert_eq!(audio, payload)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_kth_frame_emits_a_recipient_level() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let before = h.store.snapshot(&h.session_id).await.unwrap().last_seq;
        let payload = BASE64_STANDARD.encode([0x80u8; 160]);
        for _ in 0..16 {
            h.core
                .handle_carrier_frame(CarrierFrame::Media {
                    media: Some(MediaPayload {
                        track: None,
                        payload: payload.clone(),
                    }),
                })
                .await;
        }
        let events = h.store.events_since(&h.session_id, before).await;
        let levels: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::AudioLevel { .. }))
            .collect();
        assert_eq!(levels.len(), 2);
    }

    #[tokio::test]
    async fn stop_completes_the_session_with_reason() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let flow = h
            .core
            .handle_carrier_frame(CarrierFrame::Stop {
                stop: Some(StopPayload {
                    call_sid: Some("CA1".to_string()),
                    reason: Some("call completed".to_string()),
                }),
            })
            .await;
        assert_eq!(flow, BridgeFlow::Shutdown);
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Completed);
        assert_eq!(snapshot.terminal_reason.as_deref(), Some("call completed"));
    }

    #[tokio::test]
    async fn transcription_events_mutate_the_store() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        h.core
            .handle_model_event(ServerEvent::InputTranscriptionDelta {
                item_id: "R1".to_string(),
                delta: Some("Hello".to_string()),
            })
            .await;
        h.core
            .handle_model_event(ServerEvent::InputTranscriptionCompleted {
                item_id: "R1".to_string(),
                transcript: Some("Hello, this is Jerry.".to_string()),
            })
            .await;
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.transcript[0].text, "Hello, this is Jerry.");
        assert!(snapshot.transcript[0].is_final);
    }

    #[tokio::test]
    async fn committed_anchors_transcript_order() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        h.core
            .handle_model_event(ServerEvent::InputAudioBufferCommitted {
                previous_item_id: None,
                item_id: "A".to_string(),
            })
            .await;
        h.core
            .handle_model_event(ServerEvent::InputAudioBufferCommitted {
                previous_item_id: None,
                item_id: "C".to_string(),
            })
            .await;
        h.core
            .handle_model_event(ServerEvent::InputAudioBufferCommitted {
                previous_item_id: Some("A".to_string()),
                item_id: "B".to_string(),
            })
            .await;
        for (id, text) in [("A", "one"), ("B", "two"), ("C", "three")] {
            h.store
                .append_transcript_final(&h.session_id, id, Speaker::Recipient, text, None)
                .await;
        }
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        let ids: Vec<&str> = snapshot
            .transcript
            .iter()
            .map(|i| i.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn barge_in_sends_clear_cancel_truncate() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        h.core
            .handle_model_event(ServerEvent::ResponseCreated {
                response: Some(crate::model::messages::ResponseInfo {
                    id: Some("resp_1".to_string()),
                    status: None,
                }),
            })
            .await;
        // Four 320-byte deltas: 160 ms dispatched.
        for _ in 0..4 {
            h.core.handle_model_event(audio_delta("item_1", 320)).await;
        }
        // Let a wall-clock moment pass so elapsed > 0 but < sent.
        tokio::time::advance(std::time::Duration::from_millis(120)).await;

        h.core
            .handle_model_event(ServerEvent::SpeechStarted {
                audio_start_ms: Some(500),
                item_id: Some("R2".to_string()),
            })
            .await;

        // Drain the forwarded audio frames first.
        let mut saw_clear = false;
        while let Some(frame) = h.try_carrier_frame() {
            if matches!(frame, CarrierOutFrame::Clear { .. }) {
                saw_clear = true;
            }
        }
        assert!(saw_clear, "expected a carrier clear frame");

        let mut saw_cancel = false;
        let mut truncate_ms = None;
        while let Some(event) = h.try_model_event() {
            match event {
                ClientEvent::ResponseCancel { event_id } => {
                    assert!(event_id.is_some());
                    saw_cancel = true;
                }
                ClientEvent::ConversationItemTruncate {
                    item_id,
                    content_index,
                    audio_end_ms,
                    event_id,
                } => {
                    assert_eq!(item_id, "item_1");
                    assert_eq!(content_index, 0);
                    assert!(event_id.is_some());
                    truncate_ms = Some(audio_end_ms);
                }
                _ => {}
            }
        }
        assert!(saw_cancel, "expected response.cancel");
        // min(sent=160, elapsed=120) = 120.
        assert_eq!(truncate_ms, Some(120));
    }

    #[tokio::test(start_paused = true)]
    async fn second_barge_in_is_a_no_op() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        h.core.handle_model_event(audio_delta("item_1", 320)).await;
        h.core
            .handle_model_event(ServerEvent::SpeechStarted {
                audio_start_ms: None,
                item_id: None,
            })
            .await;
        while h.carrier_rx.try_recv().is_ok() {}
        while h.model_rx.try_recv().is_ok() {}

        h.core
            .handle_model_event(ServerEvent::SpeechStarted {
                audio_start_ms: None,
                item_id: None,
            })
            .await;
        assert!(h.carrier_rx.try_recv().is_err(), "no second clear expected");
        assert!(h.model_rx.try_recv().is_err(), "no second controls expected");
    }

    #[tokio::test]
    async fn recoverable_error_does_not_fail_the_session() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let flow = h
            .core
            .handle_model_event(ServerEvent::Error {
                error: ModelApiError {
                    error_type: Some("invalid_request_error".to_string()),
                    code: Some("response_cancel_not_active".to_string()),
                    message: Some("Cancellation failed: no active response".to_string()),
                    event_id: None,
                },
            })
            .await;
        assert_eq!(flow, BridgeFlow::Continue);
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::InProgress);
    }

    #[tokio::test]
    async fn pending_event_id_makes_an_error_recoverable() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        h.core.handle_model_event(audio_delta("item_1", 320)).await;
        h.core
            .handle_model_event(ServerEvent::SpeechStarted {
                audio_start_ms: None,
                item_id: None,
            })
            .await;
        // Capture the truncate's event id and replay it as an error.
        let mut control_id = None;
        while let Some(event) = h.try_model_event() {
            if let ClientEvent::ConversationItemTruncate { event_id, .. } = event {
                control_id = event_id;
            }
        }
        let control_id = control_id.expect("truncate carried an event id");
        let flow = h
            .core
            .handle_model_event(ServerEvent::Error {
                error: ModelApiError {
                    error_type: None,
                    code: Some("some_unlisted_code".to_string()),
                    message: Some("already gone".to_string()),
                    event_id: Some(control_id),
                },
            })
            .await;
        assert_eq!(flow, BridgeFlow::Continue);
    }

    #[tokio::test]
    async fn fatal_model_error_fails_the_session() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ1", "CA1")).await;
        let flow = h
            .core
            .handle_model_event(ServerEvent::Error {
                error: ModelApiError {
                    error_type: Some("server_error".to_string()),
                    code: None,
                    message: Some("the model fell over".to_string()),
                    event_id: None,
                },
            })
            .await;
        assert_eq!(flow, BridgeFlow::Shutdown);
        let snapshot = h.store.snapshot(&h.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Failed);
        assert_eq!(
            snapshot.terminal_reason.as_deref(),
            Some("the model fell over")
        );
    }

    #[tokio::test]
    async fn assistant_audio_is_forwarded_on_the_bound_stream() {
        let mut h = harness().await;
        h.core.handle_carrier_frame(start_frame("MZ7", "CA1")).await;
        h.core.handle_model_event(audio_delta("item_1", 160)).await;
        match h.carrier_rx.recv().await.unwrap() {
            CarrierSend::Frame(CarrierOutFrame::Media { stream_sid, .. }) => {
                assert_eq!(stream_sid, "MZ7")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
