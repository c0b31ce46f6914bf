//! WebSocket upgrade with path routing.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use super::ServerError;

/// Time allowed for the HTTP upgrade exchange
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Performs the server side of the WebSocket handshake.
///
/// Requests for any path other than `ws_path` are answered with
/// `404 Not Found` and reported as `ServerError::Handshake`.
pub async fn upgrade<S>(stream: S, ws_path: &str) -> Result<WebSocketStream<S>, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected = ws_path.to_string();
    let route = move |request: &Request, response: Response| {
        if request.uri().path() == expected {
            Ok(response)
        } else {
            debug!(path = %request.uri().path(), "Rejecting upgrade for unknown path");
            let mut error = ErrorResponse::new(Some("not found".to_string()));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    };

    match timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_hdr_async(stream, route)).await {
        Ok(Ok(ws)) => Ok(ws),
        Ok(Err(e)) => Err(ServerError::Handshake(e.to_string())),
        Err(_) => Err(ServerError::Handshake("timed out".to_string())),
    }
}
