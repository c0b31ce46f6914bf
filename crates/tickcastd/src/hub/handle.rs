//! Client interface for interacting with the HubActor.
//!
//! The `HubHandle` provides a cheap-to-clone interface for sending events
//! to the hub's three input queues.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `HubError::ChannelClosed`

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use tickcast_protocol::ClientId;

use super::commands::{CastData, ClientHandle, HubError, HubEvent, Registration, ResponseMessage};

// ============================================================================
// Hub Handle
// ============================================================================

/// Handle for interacting with the hub actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks. The
/// hub keeps running while at least one handle exists (or until it is
/// cancelled).
///
/// # Usage
///
/// ```ignore
/// let (mailbox_tx, mailbox_rx) = hub.mailbox();
/// hub.subscribe(ClientHandle::new(id.clone(), mailbox_tx)).await?;
///
/// hub.cast(CastData::unicast(id.clone())).await?;
///
/// hub.unsubscribe(id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<HubEvent>,
    unregister_tx: mpsc::Sender<HubEvent>,
    cast_tx: mpsc::Sender<HubEvent>,

    /// Capacity for mailboxes created through this handle
    mailbox_capacity: usize,
}

impl HubHandle {
    pub(super) fn new(
        register_tx: mpsc::Sender<HubEvent>,
        unregister_tx: mpsc::Sender<HubEvent>,
        cast_tx: mpsc::Sender<HubEvent>,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            register_tx,
            unregister_tx,
            cast_tx,
            mailbox_capacity,
        }
    }

    /// Registers a client.
    ///
    /// Returns once the hub has processed the request, so anything the
    /// caller does afterwards happens after the client is in the registry.
    ///
    /// # Errors
    ///
    /// - `HubError::HubFull` if a hard client cap is enforced and reached
    /// - `HubError::ChannelClosed` if the hub has shut down
    pub async fn subscribe(&self, client: ClientHandle) -> Result<Registration, HubError> {
        let (tx, rx) = oneshot::channel();

        self.register_tx
            .send(HubEvent::Register {
                client,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)?
    }

    /// Unregisters a client and closes its mailbox.
    ///
    /// Returns `false` if the client was not registered; unsubscribing
    /// twice is harmless.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the hub has shut down
    pub async fn unsubscribe(&self, client_id: ClientId) -> Result<bool, HubError> {
        let (tx, rx) = oneshot::channel();

        self.unregister_tx
            .send(HubEvent::Unregister {
                client_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Queues a cast, waiting for space if the cast queue is full.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the hub has shut down
    pub async fn cast(&self, data: CastData) -> Result<(), HubError> {
        self.cast_tx
            .send(HubEvent::Cast(data))
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Queues a cast without waiting.
    ///
    /// # Errors
    ///
    /// - `HubError::CastQueueFull` if the cast queue has no free slot
    /// - `HubError::ChannelClosed` if the hub has shut down
    pub fn try_cast(&self, data: CastData) -> Result<(), HubError> {
        self.cast_tx
            .try_send(HubEvent::Cast(data))
            .map_err(|e| match e {
                TrySendError::Full(_) => HubError::CastQueueFull,
                TrySendError::Closed(_) => HubError::ChannelClosed,
            })
    }

    /// Creates a mailbox with the configured capacity.
    pub fn mailbox(
        &self,
    ) -> (
        mpsc::Sender<ResponseMessage>,
        mpsc::Receiver<ResponseMessage>,
    ) {
        mpsc::channel(self.mailbox_capacity)
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    /// Returns `true` while the hub is still accepting events.
    pub fn is_connected(&self) -> bool {
        !self.register_tx.is_closed()
    }
}
