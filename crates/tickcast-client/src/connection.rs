//! One load-test connection.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use tickcast_protocol::{Command, ResponseFrame};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a reader saw before its connection closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Number of broadcast frames received
    pub broadcasts: usize,
    /// Every count received, in order
    pub counts: Vec<usize>,
    /// Frames that did not decode as a response
    pub undecodable: usize,
}

/// A single WebSocket connection to the broadcaster.
///
/// The write half stays here; the read half is handed to a background
/// task by [`LoadClient::read_responses`].
pub struct LoadClient {
    index: usize,
    writer: SplitSink<WsStream, Message>,
    reader: Option<SplitStream<WsStream>>,
}

impl LoadClient {
    /// Dials `url`. `index` only labels log lines.
    pub async fn connect(url: &str, index: usize) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connect {
                url: url.to_string(),
                error: e.to_string(),
            })?;
        let (writer, reader) = ws.split();

        debug!(client = index, url = %url, "Connected");
        Ok(Self {
            index,
            writer,
            reader: Some(reader),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn subscribe(&mut self) -> Result<(), ClientError> {
        self.send_command(Command::Subscribe).await
    }

    pub async fn unsubscribe(&mut self) -> Result<(), ClientError> {
        self.send_command(Command::Unsubscribe).await
    }

    pub async fn num_connections(&mut self) -> Result<(), ClientError> {
        self.send_command(Command::NumConnections).await
    }

    /// Sends one command as a binary frame.
    pub async fn send_command(&mut self, command: Command) -> Result<(), ClientError> {
        let frame = command.encode()?;
        info!(client = self.index, command = %command, "Sending command");
        self.writer
            .send(Message::Binary(frame))
            .await
            .map_err(|e| ClientError::Send(e.to_string()))
    }

    /// Sends a close frame and releases the write half.
    ///
    /// A connection the server already closed is not an error.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let result = match self.writer.send(Message::Close(None)).await {
            Ok(()) => self.writer.close().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_already_closed(&e) => {
                debug!(client = self.index, error = %e, "Connection already closed");
                Ok(())
            }
            Err(e) => Err(ClientError::Send(e.to_string())),
        }
    }

    /// Starts logging every response on a background task.
    ///
    /// The task ends when the connection closes and returns what it saw.
    /// Returns `None` if the reader was already started.
    pub fn read_responses(&mut self) -> Option<JoinHandle<ReadSummary>> {
        let reader = self.reader.take()?;
        Some(tokio::spawn(read_loop(self.index, reader)))
    }
}

fn is_already_closed(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(
            WsProtocolError::ResetWithoutClosingHandshake | WsProtocolError::SendAfterClosing,
        ) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
        ),
        _ => false,
    }
}

async fn read_loop(index: usize, mut reader: SplitStream<WsStream>) -> ReadSummary {
    let mut summary = ReadSummary::default();

    while let Some(message) = reader.next().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(client = index, error = %e, "Read ended");
                break;
            }
        };

        match ResponseFrame::decode(&data) {
            Ok(ResponseFrame::Broadcast(frame)) => {
                summary.broadcasts += 1;
                let server_time = chrono::DateTime::from_timestamp(frame.timestamp, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| frame.timestamp.to_string());
                info!(
                    client = index,
                    client_id = %frame.client_id,
                    server_time = %server_time,
                    "Broadcast"
                );
            }
            Ok(ResponseFrame::NumConnections(frame)) => {
                summary.counts.push(frame.num_connections);
                info!(
                    client = index,
                    num_connections = frame.num_connections,
                    "Connection count"
                );
            }
            Err(e) => {
                summary.undecodable += 1;
                warn!(client = index, error = %e, "Undecodable frame");
            }
        }
    }

    debug!(client = index, "Reader stopped");
    summary
}
