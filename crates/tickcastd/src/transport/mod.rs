//! Connection adapter between a message-oriented transport and a `Client`.
//!
//! A connection is split once into a [`FrameSource`] (owned by the read
//! pump) and a [`FrameSink`] (owned by the write pump), so the
//! "exactly one reader, exactly one writer" rule is enforced by ownership
//! rather than by locking.
//!
//! Two adapters are provided:
//! - [`websocket`] - binary WebSocket messages over any async byte stream
//! - [`memory`] - an in-process channel pair, used by tests and embedders
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport failures are reported as `TransportError`

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a connection adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer closed the connection (close frame, EOF, or going away).
    ///
    /// This is the expected end of every connection and is not logged as
    /// a failure.
    #[error("connection closed")]
    Closed,

    /// The peer sent a data frame of the wrong kind (e.g. text instead of binary).
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Any other I/O or protocol failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates an I/O error from any error type.
    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        Self::Io(err.to_string())
    }

    /// Returns true for the orderly-close signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Reads the next data frame.
    ///
    /// Control frames are handled internally and never returned.
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Writes one data frame.
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Writes a close frame, telling the peer the server is done.
    async fn write_close(&mut self) -> Result<(), TransportError>;

    /// Releases the write side. Calling it more than once is harmless.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A bidirectional connection that can be split into its two halves.
pub trait Connection: Send + 'static {
    type Source: FrameSource;
    type Sink: FrameSink;

    /// Splits the connection. The halves are handed to different tasks.
    fn split(self) -> (Self::Source, Self::Sink);
}
