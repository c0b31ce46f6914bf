//! Error type for the load-generation client.

use thiserror::Error;

use tickcast_protocol::ProtocolError;

/// Errors raised while driving client connections.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {error}")]
    Connect { url: String, error: String },

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Every dial failed, so there is nothing to drive.
    #[error("no clients connected")]
    NoClients,
}
