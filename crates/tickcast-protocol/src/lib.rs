//! tickcast Protocol - Wire protocol for hub communication
//!
//! This crate provides the frame types exchanged between tickcast clients
//! and the daemon. Every frame is a JSON object carried in one binary
//! WebSocket message.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod client_id;
pub mod command;
pub mod error;
pub mod response;

pub use client_id::ClientId;
pub use command::{Command, CommandFrame};
pub use error::{ProtocolError, ProtocolResult};
pub use response::{BroadcastFrame, NumConnectionsFrame, ResponseFrame};
