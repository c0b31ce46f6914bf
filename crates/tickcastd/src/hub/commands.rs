//! Hub events, responses, and errors.
//!
//! This module defines the message types for communicating with the `HubActor`:
//! - `HubEvent`: the tagged union the dispatch loop consumes
//! - `CastData`: the payload of a cast (broadcast or unicast)
//! - `ResponseMessage`: what the hub places in a client's mailbox
//! - `HubError`: errors surfaced through `HubHandle`
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use tickcast_protocol::{ClientId, ResponseFrame};

// ============================================================================
// Client Handle
// ============================================================================

/// The hub's view of one client: its identity and the producing end of its mailbox.
///
/// The registry holds the only long-lived copy of the sender, so removing
/// the entry is what closes the mailbox.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    mailbox: mpsc::Sender<ResponseMessage>,
}

impl ClientHandle {
    pub fn new(id: ClientId, mailbox: mpsc::Sender<ResponseMessage>) -> Self {
        Self { id, mailbox }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub(crate) fn mailbox(&self) -> &mpsc::Sender<ResponseMessage> {
        &self.mailbox
    }
}

// ============================================================================
// Hub Events
// ============================================================================

/// Events consumed by the hub's dispatch loop.
///
/// Each variant arrives on its own queue; the loop wraps whatever it
/// receives into a `HubEvent` and handles it to completion before taking
/// the next one.
#[derive(Debug)]
pub enum HubEvent {
    /// Add a client to the registry.
    ///
    /// # Errors
    /// - `HubError::HubFull` if a hard client cap is enforced and reached
    Register {
        client: ClientHandle,
        respond_to: oneshot::Sender<Result<Registration, HubError>>,
    },

    /// Remove a client from the registry and close its mailbox.
    ///
    /// Responds `true` if the client was registered.
    Unregister {
        client_id: ClientId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Deliver a broadcast or unicast.
    Cast(CastData),
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The client was added.
    Added,
    /// The identity was already present; the registry is unchanged.
    AlreadyRegistered,
}

/// Payload of a cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastData {
    /// Server time for every registered client
    Broadcast { time: DateTime<Utc> },

    /// Connection count for one client
    Unicast { client_id: ClientId },
}

impl CastData {
    /// A broadcast stamped with the current time.
    pub fn broadcast_now() -> Self {
        Self::Broadcast { time: Utc::now() }
    }

    pub fn broadcast_at(time: DateTime<Utc>) -> Self {
        Self::Broadcast { time }
    }

    pub fn unicast(client_id: ClientId) -> Self {
        Self::Unicast { client_id }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Message placed in a client's mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMessage {
    Broadcast {
        client_id: ClientId,
        time: DateTime<Utc>,
    },
    NumConnections {
        count: usize,
    },
}

impl ResponseMessage {
    /// Converts to the wire frame. Timestamps are truncated to whole seconds.
    pub fn to_frame(&self) -> ResponseFrame {
        match self {
            Self::Broadcast { client_id, time } => {
                ResponseFrame::broadcast(client_id.clone(), time.timestamp())
            }
            Self::NumConnections { count } => ResponseFrame::num_connections(*count),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during hub operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub has reached its enforced client cap.
    #[error("hub is full (max: {max} clients)")]
    HubFull {
        /// Maximum number of clients allowed
        max: usize,
    },

    /// The cast queue has no free slot (non-blocking casts only).
    #[error("cast queue is full")]
    CastQueueFull,

    /// The hub's queues or the response channel were closed.
    ///
    /// This typically indicates the hub was shut down.
    #[error("hub channel closed")]
    ChannelClosed,
}

/// Reason why a client was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client asked to leave, or its connection failed.
    Unsubscribed,

    /// Mailbox was full and the slow-client policy is `Disconnect`.
    SlowConsumer,

    /// The client's write pump has already gone away.
    MailboxClosed,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::SlowConsumer => write!(f, "mailbox full, client too slow"),
            Self::MailboxClosed => write!(f, "mailbox receiver dropped"),
        }
    }
}
