//! Protocol error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while decoding or encoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is not valid JSON or lacks a required field.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Frame is well-formed but names a command the server does not know.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Frame could not be serialized.
    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Creates a malformed-frame error from any error type.
    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        Self::Malformed(err.to_string())
    }

    /// Creates an encode error from any error type.
    pub fn encode<E: std::fmt::Display>(err: E) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
