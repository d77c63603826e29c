//! Carrier media websocket endpoint and the socket pumps around the bridge
//! core.
//!
//! Lifecycle: accept the carrier socket, wait up to ten seconds for a
//! `start` frame that resolves to a session (custom parameter first, then
//! the carrier-call-id reverse index), open the model socket, configure the
//! model session, then pump both legs through [`BridgeCore`] until either
//! side closes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use crate::model::messages::{
    ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection,
};
use crate::model::{self, PCMU_FORMAT};
use crate::prompt;
use crate::session::CallStatus;
use crate::state::AppState;
use crate::twilio::messages::{CarrierFrame, StartPayload};

use super::core::{BridgeCore, BridgeFlow, CarrierSend, ModelSend};

/// How long the carrier has to send a resolvable `start` frame.
const BIND_TIMEOUT: Duration = Duration::from_secs(10);

/// Policy-violation close code used for unresolvable bindings.
const CLOSE_POLICY: u16 = 1008;

/// Outbound channel capacity per leg.
const LEG_BUFFER: usize = 256;

/// `GET /twilio/call` — the carrier's bidirectional media stream.
pub async fn carrier_media_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_carrier_socket(socket, state))
}

async fn handle_carrier_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut carrier_sink, mut carrier_stream) = socket.split();

    // Phase 1: bind to a session or give up.
    let bound = tokio::time::timeout(
        BIND_TIMEOUT,
        await_start(&mut carrier_stream, &state),
    )
    .await;
    let (start_frame, session_id) = match bound {
        Ok(Some(bound)) => bound,
        Ok(None) => {
            debug!("carrier socket ended before a start frame");
            return;
        }
        Err(_) => {
            warn!("no session binding within {BIND_TIMEOUT:?}, closing carrier socket");
            let _ = carrier_sink
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_POLICY,
                    reason: "missing session binding".into(),
                })))
                .await;
            return;
        }
    };

    info!(%session_id, "carrier media stream bound");

    // Phase 2: open and configure the model leg.
    let Some(api_key) = state.settings.model.api_key.clone() else {
        fail_and_close(
            &state,
            &session_id,
            "OpenAI is not configured. Set OPENAI_API_KEY.",
            &mut carrier_sink,
        )
        .await;
        return;
    };
    let model_socket = match model::connect(&api_key, &state.settings.model.realtime_model).await {
        Ok(socket) => socket,
        Err(e) => {
            fail_and_close(&state, &session_id, &e.to_string(), &mut carrier_sink).await;
            return;
        }
    };
    let (mut model_sink, mut model_stream) = model_socket.split();

    // Configure the session before any audio flows.
    let brief = state.sessions.brief(&session_id).await.unwrap_or_default();
    let instructions = prompt::build_instructions(&state.settings, &brief).await;
    let configure = ClientEvent::SessionUpdate {
        session: SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(instructions),
            voice: Some(state.settings.model.voice.clone()),
            input_audio_format: Some(PCMU_FORMAT.to_string()),
            output_audio_format: Some(PCMU_FORMAT.to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: state.settings.model.transcription_model.clone(),
            }),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: None,
                prefix_padding_ms: None,
                silence_duration_ms: None,
                create_response: Some(true),
                interrupt_response: Some(true),
            }),
        },
    };
    if let Err(e) = send_model_event(&mut model_sink, &configure).await {
        fail_and_close(&state, &session_id, &e, &mut carrier_sink).await;
        return;
    }

    // Phase 3: pump both legs through the core. Each sink gets its own
    // sender task so a slow write on one leg never stalls the other, and
    // the core's bounded sends always have a live drainer.
    let (carrier_tx, mut carrier_rx) = mpsc::channel::<CarrierSend>(LEG_BUFFER);
    let (model_tx, mut model_rx) = mpsc::channel::<ModelSend>(LEG_BUFFER);

    let carrier_sender = {
        let session_id = session_id.clone();
        tokio::spawn(async move {
            while let Some(send) = carrier_rx.recv().await {
                match send {
                    CarrierSend::Frame(frame) => {
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(%session_id, "failed to serialize carrier frame: {e}");
                                continue;
                            }
                        };
                        if carrier_sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    CarrierSend::Close => {
                        let _ = carrier_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        })
    };

    let model_sender = tokio::spawn(async move {
        while let Some(send) = model_rx.recv().await {
            match send {
                ModelSend::Event(event) => {
                    if send_model_event(&mut model_sink, &event).await.is_err() {
                        break;
                    }
                }
                ModelSend::Pong(data) => {
                    let _ = model_sink
                        .send(tungstenite::Message::Pong(data.into()))
                        .await;
                }
                ModelSend::Close => {
                    let _ = model_sink.send(tungstenite::Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut core = BridgeCore::new(
        session_id.clone(),
        state.sessions.clone(),
        carrier_tx.clone(),
        model_tx.clone(),
        state.settings.audio_level_stride,
        state.settings.audio_level_gain,
    );

    // Replay the bound start frame so the core records the stream sid, the
    // carrier call id, and the in-progress transition.
    core.handle_carrier_frame(start_frame).await;
    core.mark_active();

    loop {
        tokio::select! {
            // Inbound from the carrier.
            msg = carrier_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<CarrierFrame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!(%session_id, "unparseable carrier frame ({e}): {}", preview(&text));
                                continue;
                            }
                        };
                        if core.handle_carrier_frame(frame).await == BridgeFlow::Shutdown {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let closed_normally =
                            frame.as_ref().map(|f| f.code == 1000).unwrap_or(false);
                        debug!(%session_id, "carrier socket closed: {frame:?}");
                        if !closed_normally {
                            let reason = frame
                                .map(|f| format!("carrier closed ({}): {}", f.code, f.reason))
                                .unwrap_or_else(|| "carrier closed".to_string());
                            state
                                .sessions
                                .update_status(&session_id, CallStatus::Failed, Some(&reason))
                                .await;
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%session_id, "carrier socket error: {e}");
                        state
                            .sessions
                            .update_status(
                                &session_id,
                                CallStatus::Failed,
                                Some(&format!("carrier socket error: {e}")),
                            )
                            .await;
                        break;
                    }
                    None => break,
                }
            }

            // Inbound from the model.
            msg = model_stream.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let event = match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                debug!(%session_id, "unparseable model event ({e}): {}", preview(&text));
                                continue;
                            }
                        };
                        if core.handle_model_event(event).await == BridgeFlow::Shutdown {
                            break;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        let _ = model_tx.send(ModelSend::Pong(data.to_vec())).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let closed_normally = frame
                            .as_ref()
                            .map(|f| u16::from(f.code) == 1000)
                            .unwrap_or(false);
                        debug!(%session_id, "model socket closed: {frame:?}");
                        if !closed_normally {
                            let reason = frame
                                .map(|f| format!("model closed ({}): {}", u16::from(f.code), f.reason))
                                .unwrap_or_else(|| "model closed".to_string());
                            state
                                .sessions
                                .update_status(&session_id, CallStatus::Failed, Some(&reason))
                                .await;
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%session_id, "model socket error: {e}");
                        state
                            .sessions
                            .update_status(
                                &session_id,
                                CallStatus::Failed,
                                Some(&format!("model socket error: {e}")),
                            )
                            .await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Teardown: close both legs cleanly; terminality is already recorded
    // (update_status no-ops after the first terminal transition).
    let _ = model_tx.send(ModelSend::Close).await;
    let _ = carrier_tx.send(CarrierSend::Close).await;
    let _ = tokio::join!(carrier_sender, model_sender);
    core.mark_closed();
    info!(%session_id, "bridge closed");
}

/// Read carrier frames until a `start` resolves to a session. Resolution
/// order: the `sessionId` custom parameter, then the carrier-call-id
/// reverse index. Returns `None` when the socket ends first.
async fn await_start(
    carrier_stream: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
) -> Option<(CarrierFrame, String)> {
    while let Some(msg) = carrier_stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        let frame = match serde_json::from_str::<CarrierFrame>(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("unparseable pre-start frame ({e}): {}", preview(&text));
                continue;
            }
        };
        if let CarrierFrame::Start { stream_sid, start } = frame {
            let payload = start.unwrap_or_default();
            if let Some(session_id) = resolve_session(state, &payload).await {
                let frame = CarrierFrame::Start {
                    stream_sid,
                    start: Some(payload),
                };
                return Some((frame, session_id));
            }
            warn!("start frame did not resolve to a session, waiting for timeout");
        }
    }
    None
}

async fn resolve_session(state: &Arc<AppState>, payload: &StartPayload) -> Option<String> {
    if let Some(session_id) = payload.custom_parameters.get("sessionId") {
        if state.sessions.exists(session_id).await {
            return Some(session_id.clone());
        }
    }
    if let Some(call_sid) = payload.call_sid.as_deref() {
        return state.sessions.session_id_by_carrier(call_sid).await;
    }
    None
}

async fn send_model_event(
    model_sink: &mut SplitSink<model::ModelSocket, tungstenite::Message>,
    event: &ClientEvent,
) -> Result<(), String> {
    let json = serde_json::to_string(event).map_err(|e| e.to_string())?;
    model_sink
        .send(tungstenite::Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Mark the session failed and close the carrier socket. Used for failures
/// before the pump loop starts.
async fn fail_and_close(
    state: &Arc<AppState>,
    session_id: &str,
    reason: &str,
    carrier_sink: &mut SplitSink<WebSocket, Message>,
) {
    warn!(%session_id, "bridge setup failed: {reason}");
    state
        .sessions
        .update_status(session_id, CallStatus::Failed, Some(reason))
        .await;
    let _ = carrier_sink.send(Message::Close(None)).await;
}

/// Short, log-safe preview of an unparseable payload.
fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn preview_truncates_long_payloads() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.len() < 130);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn preview_keeps_short_payloads() {
        assert_eq!(preview("{\"event\":\"mark\"}"), "{\"event\":\"mark\"}");
    }
}
