// Client frame envelope for the tabula-board.v1 protocol.
//
// A frame is one logical unit on the persistent connection: an opening
// `connect`, a `subscribe` to a topic, a `send` to an application
// destination, or a closing `disconnect`. Headers carry transport-level
// metadata (authorization, the raw upgrade query string); the body is a
// destination-specific JSON payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Frame commands a client may issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameCommand {
    Connect,
    Send,
    Subscribe,
    Disconnect,
}

/// One inbound client frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    pub command: FrameCommand,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ClientFrame {
    /// Case-sensitive header lookup, `None` for absent or empty values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str).filter(|value| !value.is_empty())
    }
}

/// Application destinations a `send` frame may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDestination {
    Draw,
    Join,
    Leave,
    Chat,
    Cursor,
}

impl AppDestination {
    /// Parse a `send` destination, e.g. `/app/draw`.
    pub fn parse(destination: &str) -> Option<Self> {
        match destination {
            "/app/draw" => Some(Self::Draw),
            "/app/join" => Some(Self::Join),
            "/app/leave" => Some(Self::Leave),
            "/app/chat" => Some(Self::Chat),
            "/app/cursor" => Some(Self::Cursor),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draw => "/app/draw",
            Self::Join => "/app/join",
            Self::Leave => "/app/leave",
            Self::Chat => "/app/chat",
            Self::Cursor => "/app/cursor",
        }
    }
}

/// Body of a `send` frame to `/app/draw`. The drawing data itself is an
/// opaque payload; the server never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawPayload {
    pub room_id: Uuid,
    pub op_type: String,
    pub data: Value,
}

/// Body of a `send` frame to `/app/join`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinPayload {
    pub room_id: Uuid,
}

/// Body of a `send` frame to `/app/leave`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeavePayload {
    pub room_id: Uuid,
}

/// Body of a `send` frame to `/app/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatPayload {
    pub room_id: Uuid,
    pub content: String,
}

/// Body of a `send` frame to `/app/cursor`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorPayload {
    pub room_id: Uuid,
    pub x: f64,
    pub y: f64,
}
