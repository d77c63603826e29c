//! Widget asset registry.
//!
//! Static artifacts under the assets directory, re-read from disk on every
//! request so UI rebuilds propagate without a restart. Paths are validated
//! against traversal; content types come from the extension.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

/// `GET /assets/{*path}` — serve one artifact.
pub async fn asset_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, AppError> {
    if !is_safe_asset_name(&path) {
        return Err(AppError::NotFound(path));
    }
    let full = state.settings.assets_dir.join(&path);
    let bytes = tokio::fs::read(&full)
        .await
        .map_err(|_| AppError::NotFound(path.clone()))?;
    debug!(%path, bytes = bytes.len(), "serving asset");
    let mime = mime_for_path(&path);
    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response())
}

/// Allow plain relative file names only: no absolute paths, no parent
/// traversal, no backslashes, nothing hidden.
pub fn is_safe_asset_name(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    path.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.starts_with('.'))
}

/// Content type by file extension.
pub fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "html" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(!is_safe_asset_name("../secrets.txt"));
        assert!(!is_safe_asset_name("a/../../b.html"));
        assert!(!is_safe_asset_name("/etc/passwd"));
        assert!(!is_safe_asset_name("a\\b.html"));
        assert!(!is_safe_asset_name(".env"));
        assert!(!is_safe_asset_name(""));
    }

    #[test]
    fn accepts_plain_names_and_subdirectories() {
        assert!(is_safe_asset_name("call-panel.html"));
        assert!(is_safe_asset_name("img/logo.png"));
    }

    #[test]
    fn maps_common_extensions() {
        assert_eq!(mime_for_path("x.html"), "text/html; charset=utf-8");
        assert_eq!(mime_for_path("x.js"), "text/javascript; charset=utf-8");
        assert_eq!(mime_for_path("x.png"), "image/png");
        assert_eq!(mime_for_path("x.weird"), "application/octet-stream");
    }
}
