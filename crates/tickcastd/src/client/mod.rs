//! Per-connection bridge between a transport and the hub.
//!
//! Each connected peer gets one `Client`, which:
//! - Assigns the peer a fresh identity
//! - Registers with the hub before reading any command
//! - Runs a read pump (commands in) and a write pump (responses out)
//!
//! Only the write pump ever writes to the connection and only the read
//! pump ever reads from it. Both pumps converge on releasing the
//! connection, which is why release is idempotent.
//!
//! # State machine
//!
//! ```text
//! Connected ──register──▶ Subscribed ──unsubscribe / failure──▶ Unsubscribing ──▶ Closed
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport and hub errors end the client; they never propagate further

mod pump;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tickcast_protocol::ClientId;

use crate::hub::{ClientHandle, HubError, HubHandle, ResponseMessage};
use crate::transport::{Connection, FrameSink};

use pump::{ReadPump, WritePump};

/// Lifecycle of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Connection accepted, not yet registered
    Connected,
    /// Registered with the hub
    Subscribed,
    /// Leaving: explicit unsubscribe, eviction, or a transport failure
    Unsubscribing,
    /// Both pumps exited and the connection is released
    Closed,
}

/// One connected peer, before its pumps are started.
pub struct Client<C: Connection> {
    id: ClientId,
    hub: HubHandle,
    conn: C,
    mailbox_tx: mpsc::Sender<ResponseMessage>,
    mailbox_rx: mpsc::Receiver<ResponseMessage>,
}

impl<C: Connection> Client<C> {
    /// Binds a connection to the hub under a freshly generated identity.
    ///
    /// Does not register; that is the first thing [`Client::run`] does.
    pub fn new(hub: HubHandle, conn: C) -> Self {
        Self::with_id(hub, conn, ClientId::generate())
    }

    /// Like [`Client::new`] with a caller-chosen identity.
    pub fn with_id(hub: HubHandle, conn: C, id: ClientId) -> Self {
        let (mailbox_tx, mailbox_rx) = hub.mailbox();
        Self {
            id,
            hub,
            conn,
            mailbox_tx,
            mailbox_rx,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Registers with the hub, then starts both pumps and returns without
    /// waiting for them.
    ///
    /// # Errors
    ///
    /// - `HubError::HubFull` if the hub enforces a client cap and is full
    /// - `HubError::ChannelClosed` if the hub has shut down
    ///
    /// On error the connection has already been sent a close frame and
    /// released.
    pub async fn run(self) -> Result<ClientTasks, HubError> {
        let Self {
            id,
            hub,
            conn,
            mailbox_tx,
            mailbox_rx,
        } = self;

        let (source, mut sink) = conn.split();
        let (state_tx, state_rx) = watch::channel(ClientState::Connected);

        // The hub gets the only strong sender, so only the hub can close the mailbox.
        let mailbox = mailbox_tx.downgrade();
        if let Err(e) = hub.subscribe(ClientHandle::new(id.clone(), mailbox_tx)).await {
            warn!(client_id = %id, error = %e, "Registration failed");
            let _ = sink.write_close().await;
            let _ = sink.close().await;
            return Err(e);
        }
        state_tx.send_replace(ClientState::Subscribed);
        debug!(client_id = %id, "Client subscribed");

        let release = CancellationToken::new();
        let write_done = CancellationToken::new();

        let writer = tokio::spawn(
            WritePump {
                client_id: id.clone(),
                sink,
                mailbox: mailbox_rx,
                release: release.clone(),
                done: write_done.clone(),
            }
            .run(),
        );

        let reader = tokio::spawn(
            ReadPump {
                client_id: id.clone(),
                source,
                hub,
                mailbox,
                release,
                write_done,
                state: state_tx,
            }
            .run(),
        );

        info!(client_id = %id, "Client started");

        Ok(ClientTasks {
            client_id: id,
            reader,
            writer,
            state: state_rx,
        })
    }
}

/// The running pumps of one client.
///
/// Dropping this does not stop the client; the pumps run until the
/// connection or the hub ends them.
pub struct ClientTasks {
    client_id: ClientId,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    state: watch::Receiver<ClientState>,
}

impl ClientTasks {
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Waits for both pumps to exit.
    pub async fn join(self) {
        if let Err(e) = self.writer.await {
            warn!(client_id = %self.client_id, error = %e, "Write pump task failed");
        }
        if let Err(e) = self.reader.await {
            warn!(client_id = %self.client_id, error = %e, "Read pump task failed");
        }
    }
}
