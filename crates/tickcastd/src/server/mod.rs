//! WebSocket front-end for the tickcast daemon.
//!
//! The server:
//! - Listens on a TCP address for incoming connections
//! - Upgrades each one to a WebSocket on the configured path
//! - Hands the upgraded connection to a `Client` bound to the hub
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept() + WebSocket upgrade
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Client      │────▶│    HubHandle    │
//! │  (read + write  │◀────│                 │
//! │     pumps)      │     └─────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-connection failures are logged and never stop the accept loop

mod upgrade;

pub use upgrade::{upgrade, HANDSHAKE_TIMEOUT};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::transport::websocket::WsConnection;

/// WebSocket server for the tickcast daemon.
pub struct DaemonServer {
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Only upgrade requests for this path are accepted
    ws_path: String,

    hub: HubHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter, used in logs
    connection_counter: AtomicU64,
}

impl DaemonServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address is invalid or already in use
    pub async fn bind(
        config: &ServerConfig,
        hub: HubHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(&config.listen_addr)
                .await
                .map_err(|e| ServerError::Bind {
                    addr: config.listen_addr.clone(),
                    error: e.to_string(),
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            ws_path: config.ws_path.clone(),
            hub,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the URL clients should dial.
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.ws_path)
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// Clients already running are not stopped here; they end when the
    /// hub shuts down or their peers go away.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr,
            path = %self.ws_path,
            "Daemon server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Server stopped"
        );
        Ok(())
    }

    /// Upgrades and starts a client on its own task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        let hub = self.hub.clone();
        let ws_path = self.ws_path.clone();

        tokio::spawn(async move {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let ws = match upgrade(stream, &ws_path).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(
                        peer = %peer,
                        connection = connection_number,
                        error = %e,
                        "WebSocket upgrade failed"
                    );
                    return;
                }
            };

            match Client::new(hub, WsConnection::new(ws)).run().await {
                Ok(tasks) => debug!(
                    peer = %peer,
                    connection = connection_number,
                    client_id = %tasks.client_id(),
                    "Connection accepted"
                ),
                Err(e) => warn!(
                    peer = %peer,
                    connection = connection_number,
                    error = %e,
                    "Client rejected"
                ),
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}
