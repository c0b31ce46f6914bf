//! Inbound command frames (client to server).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Commands a client can send to the server.
///
/// On the wire a command is the string value of the `command` field:
/// `{"command":"SUBSCRIBE"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Register with the hub and start receiving broadcasts
    Subscribe,

    /// Leave the hub; the server closes the connection afterwards
    Unsubscribe,

    /// Ask for the current number of registered clients
    NumConnections,
}

impl Command {
    /// All known commands, in wire order.
    pub const ALL: [Command; 3] = [
        Command::Subscribe,
        Command::Unsubscribe,
        Command::NumConnections,
    ];

    /// Returns the wire name of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::NumConnections => "NUM_CONNECTIONS",
        }
    }

    /// Decodes a command from a raw frame payload.
    ///
    /// Anything that is not a JSON object, or whose `command` field is
    /// present but not a string, is [`ProtocolError::Malformed`]. An object
    /// without a `command` field (or with `null`) names the empty command
    /// and, like any unrecognised name, is [`ProtocolError::UnknownCommand`].
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(data).map_err(ProtocolError::malformed)?;
        let Value::Object(fields) = value else {
            return Err(ProtocolError::Malformed(
                "command frame is not a JSON object".to_string(),
            ));
        };

        match fields.get("command") {
            None | Some(Value::Null) => Err(ProtocolError::UnknownCommand(String::new())),
            Some(Value::String(name)) => name.parse(),
            Some(other) => Err(ProtocolError::Malformed(format!(
                "command is not a string: {other}"
            ))),
        }
    }

    /// Encodes this command as a complete frame payload.
    pub fn encode(self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(&CommandFrame::new(self)).map_err(ProtocolError::encode)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

/// A command frame as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub command: Command,
}

impl CommandFrame {
    pub fn new(command: Command) -> Self {
        Self { command }
    }
}
