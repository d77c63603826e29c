//! Host transport: the request/response plane the chat host speaks.
//!
//! `GET /mcp` opens a server-sent-event stream whose first event names the
//! message endpoint for that host session; `POST /mcp/messages` accepts
//! JSON-RPC 2.0 requests whose replies flow back over the stream. The
//! dispatchable surface is the tool registry plus the widget resource
//! registry.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::tools::{self, ToolError};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Channel capacity per host stream.
const HOST_BUFFER: usize = 64;

/// Live host transport streams, keyed by host session id.
pub struct HostHub {
    peers: RwLock<HashMap<String, mpsc::Sender<Event>>>,
}

impl Default for HostHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HostHub {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    async fn register(&self, id: String, tx: mpsc::Sender<Event>) {
        self.peers.write().await.insert(id, tx);
    }

    async fn send(&self, id: &str, event: Event) -> bool {
        let tx = self.peers.read().await.get(id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    // Stream gone; forget the peer.
                    self.peers.write().await.remove(id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.peers.read().await.contains_key(id)
    }
}

/// `GET /mcp` — open the host stream.
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let host_session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Event>(HOST_BUFFER);
    state.hosts.register(host_session_id.clone(), tx).await;
    debug!(%host_session_id, "host stream open");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/mcp/messages?sessionId={host_session_id}"));
    let live = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    let stream = futures_util::stream::once(async move { Ok(endpoint) }).chain(live);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct HostSessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// A JSON-RPC 2.0 request; `id` absent means notification.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// `POST /mcp/messages?sessionId=<hostSessionId>` — JSON-RPC in, replies
/// over the stream, 202 out.
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HostSessionQuery>,
    Json(request): Json<RpcRequest>,
) -> Result<StatusCode, AppError> {
    if !state.hosts.is_registered(&query.session_id).await {
        return Err(AppError::NotFound(format!(
            "unknown host session {}",
            query.session_id
        )));
    }

    // Notifications get no reply.
    let Some(id) = request.id.clone() else {
        debug!(method = %request.method, "host notification");
        return Ok(StatusCode::ACCEPTED);
    };

    let response = dispatch(&state, &request).await;
    let body = match response {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    };
    let event = Event::default().event("message").data(body.to_string());
    if !state.hosts.send(&query.session_id, event).await {
        warn!(host_session_id = %query.session_id, "host stream closed before reply");
    }
    Ok(StatusCode::ACCEPTED)
}

async fn dispatch(state: &AppState, request: &RpcRequest) -> Result<Value, (i64, String)> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": {
                "name": "outcall-gateway",
                "version": env!("CARGO_PKG_VERSION")
            }
        })),

        "ping" => Ok(json!({})),

        "tools/list" => Ok(json!({ "tools": tools::tool_descriptors() })),

        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .ok_or((-32602, "missing tool name".to_string()))?;
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match tools::call_tool(state, name, arguments).await {
                Ok(output) => {
                    serde_json::to_value(&output).map_err(|e| (-32603, e.to_string()))
                }
                Err(ToolError::UnknownTool(name)) => {
                    Err((-32602, format!("unknown tool: {name}")))
                }
                Err(ToolError::InvalidArguments(message)) => Err((-32602, message)),
                Err(ToolError::Internal(message)) => Err((-32603, message)),
            }
        }

        "resources/list" => Ok(json!({ "resources": widget_resources(state).await })),

        "resources/read" => {
            let uri = request
                .params
                .get("uri")
                .and_then(Value::as_str)
                .ok_or((-32602, "missing uri".to_string()))?;
            read_widget_resource(state, uri).await
        }

        other => Err((-32601, format!("method not found: {other}"))),
    }
}

/// Widget artifacts advertised as `ui://widget/<name>.html` resources,
/// discovered from the assets directory on each listing.
async fn widget_resources(state: &AppState) -> Vec<Value> {
    let mut resources = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(&state.settings.assets_dir).await else {
        return resources;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(".html") {
            resources.push(json!({
                "uri": format!("ui://widget/{name}"),
                "name": stem,
                "mimeType": "text/html"
            }));
        }
    }
    resources.sort_by(|a, b| a["uri"].as_str().cmp(&b["uri"].as_str()));
    resources
}

/// Resolve `ui://widget/<name>.html` and read the artifact from disk, so a
/// rebuilt widget propagates without a restart.
async fn read_widget_resource(state: &AppState, uri: &str) -> Result<Value, (i64, String)> {
    let Some(name) = uri.strip_prefix("ui://widget/") else {
        return Err((-32602, format!("unsupported resource uri: {uri}")));
    };
    if !crate::assets::is_safe_asset_name(name) || !name.ends_with(".html") {
        return Err((-32602, format!("unsupported resource uri: {uri}")));
    }
    let path = state.settings.assets_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Ok(json!({
            "contents": [{ "uri": uri, "mimeType": "text/html", "text": text }]
        })),
        Err(_) => Err((-32602, format!("resource not found: {uri}"))),
    }
}
