//! tickcast daemon - client hub and WebSocket broadcast server
//!
//! This crate provides the core infrastructure for the tickcast daemon:
//! - `hub` - Registry actor that owns every subscribed client and dispatches casts
//! - `client` - Per-connection read and write pumps
//! - `transport` - Connection adapters (WebSocket, in-memory)
//! - `server` - TCP listener and WebSocket upgrade
//! - `config` - Daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       tickcastd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │     │         HubActor            │   │
//! │  │  (TcpListener)  │     │  (registry owner, dispatch) │◀┐ │
//! │  └────────┬────────┘     └──────────────┬──────────────┘ │ │
//! │           │ upgrade                     │ try_send       │ │
//! │           ▼                             ▼                │ │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐ │ │
//! │  │     Client      │◀────│      mailbox (bounded)      │ │ │
//! │  │ read/write pumps│     └─────────────────────────────┘ │ │
//! │  └────────┬────────┘                                     │ │
//! │           └──── subscribe / unsubscribe / cast ──────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod client;
pub mod config;
pub mod hub;
pub mod server;
pub mod transport;
