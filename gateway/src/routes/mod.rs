//! Router assembly.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assets::asset_handler;
use crate::bridge::carrier_media_handler;
use crate::mcp;
use crate::state::AppState;
use crate::twilio::handlers::{status_callback_handler, twiml_handler};
use crate::viewer::viewer_logs_handler;

/// Build the full application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // Widgets are served into the chat host's iframe; the surface is
    // read-only so permissive CORS is acceptable here.
    let cors = CorsLayer::new().allow_origin(Any);

    Router::new()
        .route("/", get(health_check))
        // Host transport.
        .route("/mcp", get(mcp::sse_handler))
        .route("/mcp/messages", post(mcp::messages_handler))
        // Widget artifacts.
        .route("/assets/{*path}", get(asset_handler))
        // Carrier surface.
        .route("/twilio/twiml", get(twiml_handler).post(twiml_handler))
        .route("/twilio/status", post(status_callback_handler))
        .route("/twilio/call", get(carrier_media_handler))
        // Viewer fan-out.
        .route("/twilio/logs", get(viewer_logs_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "outcall-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
