// Core domain types shared across Tabula crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A room is an isolated collaboration session: its own operation
/// sequence, presence set, and message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: Uuid,
    pub name: String,
    /// Username of the room's owner.
    pub owner: String,
}

/// One durable, sequenced drawing operation as served to clients
/// catching up via the operations endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationEntry {
    pub op_type: String,
    pub data: serde_json::Value,
    pub sequence: i64,
}

/// One chat message as served from room history. Chat carries no
/// sequence number; ordering is by timestamp only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHistoryEntry {
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Issued credential plus the display username, returned by register
/// and login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
}
