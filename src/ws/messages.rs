//! WebSocket message types: envelope and client commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client acknowledgment of a command.
    Response,
    /// Server → Client room broadcast.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send over WebSocket.
///
/// The connection's participant identity is implicit: it is assigned at
/// upgrade time and scoped to the socket, so a reconnecting client joins
/// again as a new participant.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Join a session by code.
    Join {
        /// Target session code.
        code: String,
        /// Display name shown to other members.
        display_name: String,
    },
    /// Submit this round's picks (write-once).
    Submit {
        /// Chosen option ids.
        option_ids: Vec<String>,
    },
    /// Reset a completed session for a new round.
    Restart,
    /// Leave the session for good (unlike a disconnect, this removes
    /// membership).
    Leave,
}
