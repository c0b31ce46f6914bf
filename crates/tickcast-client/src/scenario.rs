//! The load-test scenario.
//!
//! 1. Dial `clients` connections and subscribe each one
//! 2. Log every response on a reader task per connection
//! 3. Random client asks for the count, pause
//! 4. Random client unsubscribes, pause
//! 5. Random client asks for the count, pause
//! 6. Close everything

use std::time::Duration;

use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tickcast_protocol::Command;

use crate::connection::{LoadClient, ReadSummary};
use crate::error::ClientError;

/// Default number of connections
pub const DEFAULT_CLIENTS: usize = 10;

/// Default pause between scenario steps
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2);

/// Load test settings
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Full WebSocket URL, e.g. `ws://127.0.0.1:8080/ws`
    pub url: String,
    pub clients: usize,
    pub pause: Duration,
    /// Fixes the choice of clients for reproducible runs
    pub seed: Option<u64>,
}

impl LoadTestConfig {
    /// Settings for a server at `addr` (`host:port`) on the default path.
    pub fn for_addr(addr: &str) -> Self {
        Self {
            url: format!("ws://{addr}/ws"),
            clients: DEFAULT_CLIENTS,
            pause: DEFAULT_PAUSE,
            seed: None,
        }
    }
}

/// Outcome of a load test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadTestReport {
    /// Connections that dialled and subscribed successfully
    pub connected: usize,
    /// Total broadcasts seen across all readers
    pub broadcasts: usize,
    /// Every count answer, in the order the readers finished
    pub counts: Vec<usize>,
    /// Scenario steps as (client index, command)
    pub steps: Vec<(usize, Command)>,
}

/// Drives the scenario against one server.
pub struct LoadTest {
    config: LoadTestConfig,
    rng: StdRng,
}

impl LoadTest {
    pub fn new(config: LoadTestConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Runs the scenario to completion, or until `cancel` fires.
    ///
    /// Cancellation skips the remaining steps but still closes every
    /// connection and collects the readers.
    ///
    /// # Errors
    ///
    /// - `ClientError::NoClients` if no connection could be established
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoadTestReport, ClientError> {
        let mut clients = self.connect_all().await;
        if clients.is_empty() {
            return Err(ClientError::NoClients);
        }
        info!(connected = clients.len(), "Clients subscribed");

        let readers: Vec<JoinHandle<ReadSummary>> = clients
            .iter_mut()
            .filter_map(LoadClient::read_responses)
            .collect();

        let mut report = LoadTestReport {
            connected: clients.len(),
            ..LoadTestReport::default()
        };

        for command in [
            Command::NumConnections,
            Command::Unsubscribe,
            Command::NumConnections,
        ] {
            if cancel.is_cancelled() {
                break;
            }

            let index = self.rng.gen_range(0..clients.len());
            if let Some(client) = clients.get_mut(index) {
                if let Err(e) = client.send_command(command).await {
                    warn!(client = index, command = %command, error = %e, "Step failed");
                }
            }
            report.steps.push((index, command));

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Interrupted");
                    break;
                }
                _ = tokio::time::sleep(self.config.pause) => {}
            }
        }

        for client in &mut clients {
            if let Err(e) = client.close().await {
                warn!(client = client.index(), error = %e, "Close failed");
            }
        }

        for reader in readers {
            match reader.await {
                Ok(summary) => {
                    report.broadcasts += summary.broadcasts;
                    report.counts.extend(summary.counts);
                }
                Err(e) => warn!(error = %e, "Reader task failed"),
            }
        }

        info!(
            connected = report.connected,
            broadcasts = report.broadcasts,
            counts = ?report.counts,
            "Load test finished"
        );
        Ok(report)
    }

    /// Dials and subscribes every client concurrently, skipping failures.
    async fn connect_all(&self) -> Vec<LoadClient> {
        let url = self.config.url.as_str();
        let attempts = (0..self.config.clients).map(|index| async move {
            let mut client = LoadClient::connect(url, index).await?;
            client.subscribe().await?;
            Ok::<_, ClientError>(client)
        });

        join_all(attempts)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(client = index, error = %e, "Client failed to start");
                    None
                }
            })
            .collect()
    }
}
