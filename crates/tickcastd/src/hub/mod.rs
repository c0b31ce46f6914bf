//! Client registry and dispatch using the Actor pattern.
//!
//! The hub is the single owner of the set of registered clients. Every
//! registry change and every delivery decision happens inside one task,
//! so the registry itself needs no locking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  register   ┌─────────────────┐  try_send   ┌──────────────┐
//! │ Client pumps │────────────▶│                 │────────────▶│ Client       │
//! │ (HubHandle)  │  unregister │    HubActor     │             │ mailboxes    │
//! │              │────────────▶│                 │             │ (bounded)    │
//! └──────────────┘  cast       │ HashMap<ClientId│             └──────────────┘
//!         │  ─────────────────▶│  ClientHandle>  │
//!         │                    └─────────────────┘
//!         │                            ▲
//!  ┌──────────────┐  Broadcast cast    │
//!  │ Broadcast    │────────────────────┘
//!  │ timer        │  (every broadcast_period)
//!  └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::HubConfig;

mod actor;
mod commands;
mod handle;

pub use actor::HubActor;
pub use commands::{
    CastData, ClientHandle, HubError, HubEvent, Registration, RemovalReason, ResponseMessage,
};
pub use handle::HubHandle;

/// Buffer size of the register and unregister queues
pub const CONTROL_QUEUE_CAPACITY: usize = 64;

/// Creates the hub's queues and returns a handle plus the (not yet running) actor.
///
/// Useful when the caller wants to own the actor's task, e.g. to await it
/// on shutdown.
pub fn build_hub(config: &HubConfig) -> (HubHandle, HubActor) {
    let (register_tx, register_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let (cast_tx, cast_rx) = mpsc::channel(config.cast_queue_capacity.max(1));

    let actor = HubActor::new(
        config,
        register_rx,
        unregister_rx,
        cast_rx,
        cast_tx.downgrade(),
    );
    let handle = HubHandle::new(
        register_tx,
        unregister_tx,
        cast_tx,
        config.mailbox_capacity.max(1),
    );

    (handle, actor)
}

/// Spawns the hub actor and returns a handle for interaction.
///
/// The hub runs until `cancel` fires or every handle is dropped.
///
/// # Example
///
/// ```no_run
/// use tickcastd::config::HubConfig;
/// use tickcastd::hub::spawn_hub;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let hub = spawn_hub(&HubConfig::default(), CancellationToken::new());
///     assert!(hub.is_connected());
/// }
/// ```
pub fn spawn_hub(config: &HubConfig, cancel: CancellationToken) -> HubHandle {
    let (handle, actor) = build_hub(config);
    tokio::spawn(actor.run(cancel));
    handle
}

/// Spawns the task that injects a broadcast cast every `period`.
///
/// The timer never waits for queue space: when the cast queue is full the
/// tick is skipped. It stops when `cancel` fires or the cast queue closes.
pub(crate) fn spawn_broadcast_timer(
    period: Duration,
    cast_tx: mpsc::WeakSender<HubEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(sender) = cast_tx.upgrade() else {
                break;
            };

            match sender.try_send(HubEvent::Cast(CastData::broadcast_now())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Cast queue full, skipping broadcast tick");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        debug!("Broadcast timer stopped");
    })
}
