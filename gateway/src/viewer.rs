//! Viewer fan-out websocket endpoint.
//!
//! `GET /twilio/logs?sessionId=<id>&viewerToken=<t>&sinceSeq=<n>`
//!
//! Authenticates with the viewer token, replays buffered events with
//! `seq > sinceSeq`, then streams live events. The subscription is created
//! under the session lock, so catch-up-then-live is gapless and duplicate
//! free. Auth failures close with 1008 and no detail.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::session::{SessionEvent, ViewerMessage};
use crate::state::AppState;

/// Heartbeat interval.
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Flush window before closing a viewer of an already-terminal session.
const TERMINAL_FLUSH: Duration = Duration::from_millis(250);

const CLOSE_POLICY: u16 = 1008;
const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    #[serde(rename = "viewerToken", default)]
    pub viewer_token: Option<String>,
    #[serde(rename = "sinceSeq", default)]
    pub since_seq: Option<u64>,
}

pub async fn viewer_logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_viewer_socket(socket, state, query))
}

async fn handle_viewer_socket(socket: WebSocket, state: Arc<AppState>, query: ViewerQuery) {
    let (mut sink, mut stream) = socket.split();

    let authorized = match (&query.session_id, &query.viewer_token) {
        (Some(session_id), Some(token)) => {
            state.sessions.exists(session_id).await && state.tokens.verify(session_id, token)
        }
        _ => false,
    };
    if !authorized {
        debug!("viewer rejected");
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "unauthorized".into(),
            })))
            .await;
        return;
    }
    // Auth checked above; both are present.
    let session_id = query.session_id.unwrap_or_default();
    let since_seq = query.since_seq.unwrap_or(0);

    let Some(mut subscription) = state.sessions.subscribe(&session_id, since_seq).await else {
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "unknown session".into(),
            })))
            .await;
        return;
    };
    info!(%session_id, viewer_id = subscription.viewer_id, since_seq, "viewer subscribed");

    // Catch-up first, in order.
    for event in &subscription.catchup {
        if write_event(&mut sink, event).await.is_err() {
            state
                .sessions
                .unsubscribe(&session_id, subscription.viewer_id)
                .await;
            return;
        }
    }

    // A viewer joining after the end gets catch-up plus a prompt close.
    let already_terminal = state
        .sessions
        .snapshot(&session_id)
        .await
        .map(|s| s.status.is_terminal())
        .unwrap_or(false);
    if already_terminal {
        tokio::time::sleep(TERMINAL_FLUSH).await;
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_NORMAL,
                reason: "session ended".into(),
            })))
            .await;
        state
            .sessions
            .unsubscribe(&session_id, subscription.viewer_id)
            .await;
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            message = subscription.rx.recv() => {
                match message {
                    Some(ViewerMessage::Event(event)) => {
                        if write_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    Some(ViewerMessage::Close) | None => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_NORMAL,
                                reason: "session ended".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }

            _ = ping.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state
        .sessions
        .unsubscribe(&session_id, subscription.viewer_id)
        .await;
    debug!(%session_id, viewer_id = subscription.viewer_id, "viewer disconnected");
}

async fn write_event(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &SessionEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_default();
    sink.send(Message::Text(json.into())).await
}
