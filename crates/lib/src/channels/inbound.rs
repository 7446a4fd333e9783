//! Inbound message from a channel: delivered to the processor for relay handling.

use serde::{Deserialize, Serialize};

/// A chat message as received from the host transport. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Channel to reply through (e.g. "webhook", "shell").
    pub channel_id: String,
    pub sender_id: String,
    pub room_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        room_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            room_id: room_id.into(),
            text: text.into(),
        }
    }
}
