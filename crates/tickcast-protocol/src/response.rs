//! Outbound response frames (server to client).

use serde::{Deserialize, Serialize};

use crate::client_id::ClientId;
use crate::error::{ProtocolError, ProtocolResult};

/// Periodic server-time broadcast, addressed to one client.
///
/// Wire form: `{"client_id":"<id>","timestamp":<unix seconds>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastFrame {
    /// Identity of the receiving client
    pub client_id: ClientId,
    /// Server time in whole Unix seconds
    pub timestamp: i64,
}

/// Answer to a `NUM_CONNECTIONS` command.
///
/// Wire form: `{"num_connections":<count>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumConnectionsFrame {
    pub num_connections: usize,
}

/// Any frame the server may send.
///
/// The frames carry no explicit tag; they are told apart by their fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseFrame {
    Broadcast(BroadcastFrame),
    NumConnections(NumConnectionsFrame),
}

impl ResponseFrame {
    /// Creates a broadcast frame.
    pub fn broadcast(client_id: ClientId, timestamp: i64) -> Self {
        Self::Broadcast(BroadcastFrame {
            client_id,
            timestamp,
        })
    }

    /// Creates a connection count frame.
    pub fn num_connections(num_connections: usize) -> Self {
        Self::NumConnections(NumConnectionsFrame { num_connections })
    }

    /// Encodes this frame as a payload for one binary message.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::encode)
    }

    /// Decodes a frame received from the server.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(data).map_err(ProtocolError::malformed)
    }
}
