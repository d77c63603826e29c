//! Model websocket handshake.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::errors::BridgeError;

use super::config::realtime_url;

/// The connected model socket.
pub type ModelSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the realtime websocket for `model`, authenticating with the bearer
/// key. A non-101 upgrade surfaces as `BridgeError::ModelConnect` and the
/// caller marks the session failed.
pub async fn connect(api_key: &str, model: &str) -> Result<ModelSocket, BridgeError> {
    let url = realtime_url(model);
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| BridgeError::ModelConnect(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        format!("Bearer {api_key}")
            .parse()
            .map_err(|_| BridgeError::ModelConnect("invalid api key header".to_string()))?,
    );
    headers.insert(
        "OpenAI-Beta",
        tungstenite::http::HeaderValue::from_static("realtime=v1"),
    );

    let (socket, response) = connect_async(request)
        .await
        .map_err(|e| match e {
            tungstenite::Error::Http(resp) => BridgeError::ModelConnect(format!(
                "upgrade rejected with status {}",
                resp.status()
            )),
            other => BridgeError::ModelConnect(other.to_string()),
        })?;

    info!(status = %response.status(), %model, "model realtime socket open");
    Ok(socket)
}
