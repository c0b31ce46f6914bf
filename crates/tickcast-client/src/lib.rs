//! tickcast load-generation client
//!
//! Opens many WebSocket connections to a tickcast server, subscribes them,
//! and exercises the command set:
//! - [`LoadClient`] - one connection with typed command helpers
//! - [`LoadTest`] - the scripted multi-client scenario
//!
//! # Example
//!
//! ```no_run
//! use tickcast_client::{LoadTest, LoadTestConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tickcast_client::ClientError> {
//!     let config = LoadTestConfig::for_addr("127.0.0.1:8080");
//!     let report = LoadTest::new(config).run(CancellationToken::new()).await?;
//!     println!("{} clients, {} broadcasts", report.connected, report.broadcasts);
//!     Ok(())
//! }
//! ```

mod connection;
mod error;
mod scenario;

pub use connection::{LoadClient, ReadSummary};
pub use error::ClientError;
pub use scenario::{LoadTest, LoadTestConfig, LoadTestReport, DEFAULT_CLIENTS, DEFAULT_PAUSE};
