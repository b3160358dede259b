//! Chat domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as the server sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    #[serde(alias = "sender")]
    pub sender_username: String,
    #[serde(alias = "receiver")]
    pub receiver_username: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sent_at: String,
    #[serde(default)]
    pub read: bool,
}

/// Display side of a message relative to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Received by the local user.
    Left,
    /// Sent by the local user.
    Right,
}

/// Payload of a `sendMessage` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_username: String,
    pub content: String,
    pub sent_at: String,
    pub receiver_username: String,
}

/// Format a send timestamp: ISO-8601 in UTC without milliseconds or zone.
pub fn format_sent_at(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S").to_string()
}
