// Broadcast topics.
//
// Draw events share one global topic (the room id travels in the event
// payload); presence, chat, and cursor events use room-scoped topics.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// A subscribable broadcast topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// All drawing operations, every room.
    Draw,
    /// Presence (join/leave) events for one room.
    RoomUsers(Uuid),
    /// Chat messages for one room.
    RoomChat(Uuid),
    /// Cursor positions for one room.
    RoomCursor(Uuid),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown topic destination '{0}'")]
pub struct ParseTopicError(pub String);

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(destination: &str) -> Result<Self, Self::Err> {
        if destination == "/topic/draw" {
            return Ok(Self::Draw);
        }

        let rest = destination
            .strip_prefix("/topic/room/")
            .ok_or_else(|| ParseTopicError(destination.to_owned()))?;
        let (room_id, concern) =
            rest.split_once('/').ok_or_else(|| ParseTopicError(destination.to_owned()))?;
        let room_id =
            Uuid::parse_str(room_id).map_err(|_| ParseTopicError(destination.to_owned()))?;

        match concern {
            "users" => Ok(Self::RoomUsers(room_id)),
            "chat" => Ok(Self::RoomChat(room_id)),
            "cursor" => Ok(Self::RoomCursor(room_id)),
            _ => Err(ParseTopicError(destination.to_owned())),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draw => write!(f, "/topic/draw"),
            Self::RoomUsers(room_id) => write!(f, "/topic/room/{room_id}/users"),
            Self::RoomChat(room_id) => write!(f, "/topic/room/{room_id}/chat"),
            Self::RoomCursor(room_id) => write!(f, "/topic/room/{room_id}/cursor"),
        }
    }
}
