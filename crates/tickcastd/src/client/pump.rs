//! The read and write pumps of a client.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tickcast_protocol::{ClientId, Command, ProtocolError};

use super::ClientState;
use crate::hub::{CastData, ClientHandle, HubError, HubHandle, Registration, ResponseMessage};
use crate::transport::{FrameSink, FrameSource, TransportError};

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Read Pump
// ============================================================================

pub(super) struct ReadPump<S: FrameSource> {
    pub client_id: ClientId,
    pub source: S,
    pub hub: HubHandle,
    /// Weak so that the hub's registry entry stays the only strong sender
    pub mailbox: mpsc::WeakSender<ResponseMessage>,
    /// Fired by whichever pump finishes first
    pub release: CancellationToken,
    /// Fired by the write pump as its last act
    pub write_done: CancellationToken,
    pub state: watch::Sender<ClientState>,
}

/// Whether the read loop keeps going after a command.
enum Flow {
    Continue,
    Stop,
}

impl<S: FrameSource> ReadPump<S> {
    pub async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                _ = self.release.cancelled() => {
                    debug!(client_id = %self.client_id, "Read pump released");
                    break;
                }
                frame = self.source.read_frame() => frame,
            };

            match frame {
                Ok(frame) => {
                    if let Flow::Stop = self.handle_frame(&frame).await {
                        break;
                    }
                }
                Err(TransportError::Closed) => {
                    debug!(client_id = %self.client_id, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(client_id = %self.client_id, error = %e, "Read failed");
                    break;
                }
            }
        }

        self.leave().await;

        // The write side may still be flushing; wait for it before reporting Closed.
        self.release.cancel();
        self.write_done.cancelled().await;
        self.state.send_replace(ClientState::Closed);

        info!(client_id = %self.client_id, "Client disconnected");
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Flow {
        if self.is_leaving() {
            debug!(client_id = %self.client_id, "Ignoring command while unsubscribing");
            return Flow::Continue;
        }

        match Command::decode(frame) {
            Ok(Command::Subscribe) => self.resubscribe().await,
            Ok(Command::Unsubscribe) => {
                debug!(client_id = %self.client_id, "Unsubscribe requested");
                self.leave().await;
                Flow::Continue
            }
            Ok(Command::NumConnections) => {
                match self.hub.cast(CastData::unicast(self.client_id.clone())).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        warn!(client_id = %self.client_id, error = %e, "Count request failed");
                        Flow::Stop
                    }
                }
            }
            Err(ProtocolError::UnknownCommand(command)) => {
                warn!(
                    client_id = %self.client_id,
                    command = %command,
                    "Unknown command, unsubscribing"
                );
                self.leave().await;
                Flow::Continue
            }
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "Ignoring malformed frame");
                Flow::Continue
            }
        }
    }

    /// Handles a SUBSCRIBE from a client that is already registered.
    async fn resubscribe(&mut self) -> Flow {
        // No strong sender left means the hub already dropped this client.
        let Some(mailbox) = self.mailbox.upgrade() else {
            debug!(client_id = %self.client_id, "Mailbox closed, ignoring subscribe");
            return Flow::Continue;
        };

        match self
            .hub
            .subscribe(ClientHandle::new(self.client_id.clone(), mailbox))
            .await
        {
            Ok(Registration::AlreadyRegistered) => {
                debug!(client_id = %self.client_id, "Already subscribed");
                Flow::Continue
            }
            Ok(Registration::Added) => {
                self.state.send_replace(ClientState::Subscribed);
                Flow::Continue
            }
            Err(HubError::ChannelClosed) => Flow::Stop,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "Subscribe failed");
                Flow::Continue
            }
        }
    }

    fn is_leaving(&self) -> bool {
        matches!(
            *self.state.borrow(),
            ClientState::Unsubscribing | ClientState::Closed
        )
    }

    /// Moves to `Unsubscribing` and unregisters. Safe to call repeatedly.
    async fn leave(&mut self) {
        if self.is_leaving() {
            return;
        }
        self.state.send_replace(ClientState::Unsubscribing);

        match self.hub.unsubscribe(self.client_id.clone()).await {
            Ok(true) => debug!(client_id = %self.client_id, "Unsubscribed"),
            Ok(false) => debug!(client_id = %self.client_id, "Already removed by hub"),
            Err(e) => debug!(client_id = %self.client_id, error = %e, "Hub gone during unsubscribe"),
        }
    }
}

// ============================================================================
// Write Pump
// ============================================================================

pub(super) struct WritePump<S: FrameSink> {
    pub client_id: ClientId,
    pub sink: S,
    pub mailbox: mpsc::Receiver<ResponseMessage>,
    pub release: CancellationToken,
    pub done: CancellationToken,
}

impl<S: FrameSink> WritePump<S> {
    pub async fn run(mut self) {
        loop {
            let message = tokio::select! {
                biased;
                message = self.mailbox.recv() => message,
                _ = self.release.cancelled() => {
                    debug!(client_id = %self.client_id, "Write pump released");
                    break;
                }
            };

            let Some(message) = message else {
                debug!(client_id = %self.client_id, "Mailbox closed, sending close frame");
                match timeout(WRITE_TIMEOUT, self.sink.write_close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(client_id = %self.client_id, error = %e, "Close frame not sent"),
                    Err(_) => debug!(client_id = %self.client_id, "Close frame timed out"),
                }
                break;
            };

            let frame = match message.to_frame().encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(client_id = %self.client_id, error = %e, "Failed to encode response");
                    continue;
                }
            };

            match timeout(WRITE_TIMEOUT, self.sink.write_frame(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(TransportError::Closed)) => {
                    debug!(client_id = %self.client_id, "Write side closed");
                    break;
                }
                Ok(Err(e)) => {
                    warn!(client_id = %self.client_id, error = %e, "Write failed");
                    break;
                }
                Err(_) => {
                    warn!(client_id = %self.client_id, "Write timed out");
                    break;
                }
            }
        }

        if let Err(e) = self.sink.close().await {
            debug!(client_id = %self.client_id, error = %e, "Error releasing connection");
        }
        self.release.cancel();
        self.done.cancel();
    }
}
