//! In-process connection adapter backed by tokio channels.
//!
//! [`pair`] returns the server side (a [`MemoryConnection`] to hand to a
//! `Client`) and the peer side (a [`MemoryPeer`] that plays the remote
//! end). Dropping the peer, or calling [`MemoryPeer::hang_up`], is seen by
//! the server as an orderly close.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tickcast_protocol::{Command, ResponseFrame};

use super::{Connection, FrameSink, FrameSource, TransportError};

/// What the server side wrote to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFrame {
    /// One data frame
    Data(Vec<u8>),
    /// The server's close frame
    Close,
}

/// Creates a connected server/peer pair.
///
/// `capacity` bounds each direction; a peer that stops reading will make
/// server writes wait once `capacity` frames are in flight.
pub fn pair(capacity: usize) -> (MemoryConnection, MemoryPeer) {
    let capacity = capacity.max(1);
    let (to_server, inbound) = mpsc::channel(capacity);
    let (outbound, from_server) = mpsc::channel(capacity);

    (
        MemoryConnection { inbound, outbound },
        MemoryPeer {
            to_server: Some(to_server),
            from_server,
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<MemoryFrame>,
}

impl Connection for MemoryConnection {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn split(self) -> (Self::Source, Self::Sink) {
        (
            MemorySource {
                inbound: self.inbound,
            },
            MemorySink {
                outbound: Some(self.outbound),
            },
        )
    }
}

pub struct MemorySource {
    inbound: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

pub struct MemorySink {
    outbound: Option<mpsc::Sender<MemoryFrame>>,
}

impl MemorySink {
    async fn send(&self, frame: MemoryFrame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.send(MemoryFrame::Data(frame)).await
    }

    async fn write_close(&mut self) -> Result<(), TransportError> {
        match self.send(MemoryFrame::Close).await {
            Err(TransportError::Closed) | Ok(()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

/// Remote end of an in-memory connection.
pub struct MemoryPeer {
    to_server: Option<mpsc::Sender<Vec<u8>>>,
    from_server: mpsc::Receiver<MemoryFrame>,
}

impl MemoryPeer {
    /// Sends a raw frame to the server.
    pub async fn send(&self, frame: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        let tx = self.to_server.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Sends a well-formed command frame to the server.
    pub async fn send_command(&self, command: Command) -> Result<(), TransportError> {
        let frame = command.encode().map_err(TransportError::io)?;
        self.send(frame).await
    }

    /// Receives the next frame written by the server.
    ///
    /// Returns `None` once the server has released its write side.
    pub async fn recv(&mut self) -> Option<MemoryFrame> {
        self.from_server.recv().await
    }

    /// Receives the next frame without waiting.
    pub fn try_recv(&mut self) -> Option<MemoryFrame> {
        self.from_server.try_recv().ok()
    }

    /// Receives the next data frame and decodes it as a response.
    ///
    /// Returns `None` on a close frame, on release, or if the frame does
    /// not decode.
    pub async fn recv_response(&mut self) -> Option<ResponseFrame> {
        match self.recv().await? {
            MemoryFrame::Data(data) => ResponseFrame::decode(&data).ok(),
            MemoryFrame::Close => None,
        }
    }

    /// Closes the peer's sending direction; the server reads `Closed`.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }
}
