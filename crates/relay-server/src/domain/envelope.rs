//! JSON types carried inside text frames.
//!
//! # Message flow
//!
//! ```text
//! Peer  → Server: text frame, ideally {"message":"hi"}   →  ChatPayload
//! Server → Peers: text frame {"type":"message","body":"Client 3: hi"}  ←  Envelope
//! ```
//!
//! Clients are not required to send JSON.  When the payload is not an object
//! with a string `message` field, the whole payload text is relayed.

use serde::{Deserialize, Serialize};

use crate::domain::connection::ConnectionId;

/// Inbound chat payload in the client convention `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatPayload {
    pub message: String,
}

/// Outbound broadcast record.
///
/// ```json
/// {"type":"message","body":"Client 3: hello"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Message { body: String },
}

impl Envelope {
    /// Builds the envelope relayed to other peers for a message from `sender`.
    pub fn from_peer(sender: ConnectionId, payload: &str) -> Self {
        Envelope::Message {
            body: format!("Client {sender}: {}", extract_message(payload)),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Envelope::Message { body } => body,
        }
    }
}

/// Returns the `message` field of a JSON chat payload, or the text itself.
pub fn extract_message(payload: &str) -> String {
    match serde_json::from_str::<ChatPayload>(payload) {
        Ok(chat) => chat.message,
        Err(_) => payload.to_string(),
    }
}
