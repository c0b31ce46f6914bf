//! Hub actor - owns the client registry and runs the dispatch loop.
//!
//! The HubActor is the single owner of the registry in the system. It
//! receives events on three bounded queues (register, unregister, cast)
//! and handles each to completion before taking the next one.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Mailbox enqueues never block; a full or closed mailbox is handled locally
//! - Response channel send failures are ignored (the requester went away)

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tickcast_protocol::ClientId;

use super::commands::{
    CastData, ClientHandle, HubError, HubEvent, Registration, RemovalReason, ResponseMessage,
};
use super::spawn_broadcast_timer;
use crate::config::{HubConfig, SlowClientPolicy};

// ============================================================================
// Hub Actor
// ============================================================================

/// The hub actor - owns all registered clients.
///
/// # Ownership
///
/// The actor owns `clients`, a map of identity to [`ClientHandle`]. Each
/// handle holds the only strong sender of that client's mailbox, so
/// removing an entry is the one place a mailbox gets closed.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes events sequentially.
/// All registry mutations happen within this single task.
pub struct HubActor {
    register_rx: mpsc::Receiver<HubEvent>,
    unregister_rx: mpsc::Receiver<HubEvent>,
    cast_rx: mpsc::Receiver<HubEvent>,

    /// Used only to feed the broadcast timer; does not keep the queue open.
    cast_tx: mpsc::WeakSender<HubEvent>,

    clients: HashMap<ClientId, ClientHandle>,

    broadcast_period: Duration,
    max_clients: usize,
    enforce_max_clients: bool,
    slow_client_policy: SlowClientPolicy,

    /// Messages discarded under `SlowClientPolicy::Drop`
    dropped_messages: u64,
}

/// Upper bound on registry slots reserved up front; `max_clients` is only a hint.
const MAX_PREALLOCATED_CLIENTS: usize = 65_536;

/// Shortest broadcast period the timer accepts
const MIN_BROADCAST_PERIOD: Duration = Duration::from_millis(1);

/// Result of a non-blocking mailbox enqueue.
enum Offer {
    Delivered,
    Full,
    Closed,
}

fn offer(client: &ClientHandle, message: ResponseMessage) -> Offer {
    match client.mailbox().try_send(message) {
        Ok(()) => Offer::Delivered,
        Err(TrySendError::Full(_)) => Offer::Full,
        Err(TrySendError::Closed(_)) => Offer::Closed,
    }
}

impl HubActor {
    pub(super) fn new(
        config: &HubConfig,
        register_rx: mpsc::Receiver<HubEvent>,
        unregister_rx: mpsc::Receiver<HubEvent>,
        cast_rx: mpsc::Receiver<HubEvent>,
        cast_tx: mpsc::WeakSender<HubEvent>,
    ) -> Self {
        Self {
            register_rx,
            unregister_rx,
            cast_rx,
            cast_tx,
            clients: HashMap::with_capacity(config.max_clients.min(MAX_PREALLOCATED_CLIENTS)),
            broadcast_period: config.broadcast_period().max(MIN_BROADCAST_PERIOD),
            max_clients: config.max_clients,
            enforce_max_clients: config.enforce_max_clients,
            slow_client_policy: config.slow_client_policy,
            dropped_messages: 0,
        }
    }

    /// Runs the dispatch loop.
    ///
    /// Starts the broadcast timer, then processes events until `cancel`
    /// fires or every `HubHandle` has been dropped. The timer stops with
    /// the loop. Clients still registered at that point have their
    /// mailboxes closed when the actor is dropped, so their write pumps
    /// send a close frame and exit.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            period_ms = self.broadcast_period.as_millis() as u64,
            policy = ?self.slow_client_policy,
            "Hub starting"
        );

        let timer_cancel = cancel.child_token();
        let timer = spawn_broadcast_timer(
            self.broadcast_period,
            self.cast_tx.clone(),
            timer_cancel.clone(),
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Hub cancelled");
                    break;
                }
                event = self.register_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                event = self.unregister_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                event = self.cast_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        timer_cancel.cancel();
        if let Err(e) = timer.await {
            warn!(error = %e, "Broadcast timer task failed");
        }

        info!(
            remaining_clients = self.clients.len(),
            dropped_messages = self.dropped_messages,
            "Hub stopped"
        );
    }

    /// Handles one event to completion.
    pub(crate) fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register { client, respond_to } => {
                let result = self.handle_register(client);
                // Ignore send error - the client may have given up waiting
                let _ = respond_to.send(result);
            }
            HubEvent::Unregister {
                client_id,
                respond_to,
            } => {
                let removed = self.remove_client(&client_id, RemovalReason::Unsubscribed);
                let _ = respond_to.send(removed);
            }
            HubEvent::Cast(CastData::Broadcast { time }) => self.handle_broadcast(time),
            HubEvent::Cast(CastData::Unicast { client_id }) => self.handle_unicast(&client_id),
        }
    }

    // ========================================================================
    // Event Handlers
    // ========================================================================

    fn handle_register(&mut self, client: ClientHandle) -> Result<Registration, HubError> {
        if self.clients.contains_key(client.id()) {
            debug!(client_id = %client.id(), "Client already registered");
            return Ok(Registration::AlreadyRegistered);
        }

        if self.enforce_max_clients && self.clients.len() >= self.max_clients {
            warn!(
                client_id = %client.id(),
                max = self.max_clients,
                "Hub is full, rejecting registration"
            );
            return Err(HubError::HubFull {
                max: self.max_clients,
            });
        }

        let client_id = client.id().clone();
        self.clients.insert(client_id.clone(), client);

        info!(
            client_id = %client_id,
            total_clients = self.clients.len(),
            "Client registered"
        );
        Ok(Registration::Added)
    }

    /// Offers one broadcast to every registered client.
    fn handle_broadcast(&mut self, time: DateTime<Utc>) {
        let mut evicted = Vec::new();

        for (client_id, client) in &self.clients {
            let message = ResponseMessage::Broadcast {
                client_id: client_id.clone(),
                time,
            };
            match offer(client, message) {
                Offer::Delivered => {}
                Offer::Full => match self.slow_client_policy {
                    SlowClientPolicy::Disconnect => {
                        evicted.push((client_id.clone(), RemovalReason::SlowConsumer));
                    }
                    SlowClientPolicy::Drop => {
                        self.dropped_messages += 1;
                        debug!(client_id = %client_id, "Mailbox full, broadcast dropped");
                    }
                },
                Offer::Closed => {
                    evicted.push((client_id.clone(), RemovalReason::MailboxClosed));
                }
            }
        }

        for (client_id, reason) in evicted {
            self.remove_client(&client_id, reason);
        }
    }

    /// Sends the current registry size to one client.
    fn handle_unicast(&mut self, target: &ClientId) {
        let count = self.clients.len();
        let Some(client) = self.clients.get(target) else {
            debug!(client_id = %target, "Unicast target not registered");
            return;
        };

        let reason = match offer(client, ResponseMessage::NumConnections { count }) {
            Offer::Delivered => return,
            Offer::Full => match self.slow_client_policy {
                SlowClientPolicy::Disconnect => RemovalReason::SlowConsumer,
                SlowClientPolicy::Drop => {
                    self.dropped_messages += 1;
                    debug!(client_id = %target, "Mailbox full, count dropped");
                    return;
                }
            },
            Offer::Closed => RemovalReason::MailboxClosed,
        };
        self.remove_client(target, reason);
    }

    /// Removes a client, closing its mailbox. Returns `false` if the
    /// client was not registered.
    fn remove_client(&mut self, client_id: &ClientId, reason: RemovalReason) -> bool {
        let Some(client) = self.clients.remove(client_id) else {
            debug!(client_id = %client_id, "Client not registered, nothing to remove");
            return false;
        };
        drop(client);

        match reason {
            RemovalReason::SlowConsumer => warn!(
                client_id = %client_id,
                total_clients = self.clients.len(),
                reason = %reason,
                "Client removed"
            ),
            _ => info!(
                client_id = %client_id,
                total_clients = self.clients.len(),
                reason = %reason,
                "Client removed"
            ),
        }
        true
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns the current number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_registered(&self, client_id: &ClientId) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Returns the period of the broadcast timer.
    pub fn broadcast_period(&self) -> Duration {
        self.broadcast_period
    }

    /// Returns the number of messages discarded under the `drop` policy.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }
}
