//! WebSocket connection adapter.
//!
//! Frames are binary WebSocket messages. Ping/pong control frames are
//! answered by tungstenite itself and skipped here; a text frame is a
//! protocol violation and ends the connection.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use super::{Connection, FrameSink, FrameSource, TransportError};

/// An upgraded WebSocket connection, ready to be split between pumps.
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Source = WsSource<S>;
    type Sink = WsSink<S>;

    fn split(self) -> (Self::Source, Self::Sink) {
        let (sink, stream) = self.stream.split();
        (
            WsSource { stream },
            WsSink {
                sink,
                released: false,
            },
        )
    }
}

/// Read half of a WebSocket connection.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                None => return Err(TransportError::Closed),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    debug!(close_frame = ?frame, "Peer sent close frame");
                    return Err(TransportError::Closed);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Text(text))) => {
                    return Err(TransportError::UnexpectedFrame(format!(
                        "text frame ({} bytes), expected binary",
                        text.len()
                    )));
                }
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }
}

/// Write half of a WebSocket connection.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    released: bool,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.released {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::Binary(frame))
            .await
            .map_err(map_ws_error)
    }

    async fn write_close(&mut self) -> Result<(), TransportError> {
        if self.released {
            return Ok(());
        }
        match self.sink.send(Message::Close(None)).await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Folds the many ways a WebSocket can go away into `TransportError::Closed`.
fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Protocol(
            WsProtocolError::ResetWithoutClosingHandshake | WsProtocolError::SendAfterClosing,
        ) => TransportError::Closed,
        WsError::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            TransportError::Closed
        }
        other => TransportError::io(other),
    }
}
