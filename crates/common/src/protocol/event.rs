// Server-to-client event types for the tabula-board.v1 protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Username attached to cursor events from unauthenticated connections.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// All server-to-client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges a `connect` frame. `username` is the resolved
    /// identity, or `None` when the connection stays unauthenticated.
    Connected {
        username: Option<String>,
    },

    /// A drawing operation, re-broadcast to the global draw topic.
    /// Unauthenticated draws carry no username and no sequence.
    Draw {
        room_id: Uuid,
        op_type: String,
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence: Option<i64>,
    },

    /// A chat message, broadcast to the room's chat topic.
    Chat {
        room_id: Uuid,
        username: String,
        content: String,
        timestamp: String,
    },

    /// A cursor position, broadcast to the room's cursor topic.
    Cursor {
        room_id: Uuid,
        username: String,
        x: f64,
        y: f64,
    },

    /// Presence update after a join, with the room's full member list.
    UserJoined {
        room_id: Uuid,
        username: String,
        users: Vec<RoomMember>,
    },

    /// Presence update after a leave, with the remaining member list.
    UserLeft {
        room_id: Uuid,
        username: String,
        users: Vec<RoomMember>,
    },

    /// A frame-level failure, delivered to the offending sender only.
    Error {
        code: String,
        message: String,
    },
}

/// One member of a room's presence set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMember {
    pub user_id: Uuid,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = ServerEvent::Connected { username: Some("alice".into()) };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["username"], "alice");
    }

    #[test]
    fn unattributed_draw_omits_username_and_sequence() {
        let event = ServerEvent::Draw {
            room_id: Uuid::new_v4(),
            op_type: "stroke".into(),
            data: json!({ "points": [] }),
            username: None,
            sequence: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "draw");
        assert!(value.get("username").is_none());
        assert!(value.get("sequence").is_none());
    }

    #[test]
    fn attributed_draw_round_trips() {
        let event = ServerEvent::Draw {
            room_id: Uuid::new_v4(),
            op_type: "stroke".into(),
            data: json!({ "points": [[0, 1]] }),
            username: Some("bob".into()),
            sequence: Some(7),
        };

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: ServerEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn presence_events_carry_member_lists() {
        let room_id = Uuid::new_v4();
        let member = RoomMember { user_id: Uuid::new_v4(), username: "alice".into() };
        let event = ServerEvent::UserJoined {
            room_id,
            username: "alice".into(),
            users: vec![member.clone()],
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user_joined");
        assert_eq!(value["users"][0]["username"], "alice");
        assert_eq!(value["users"][0]["user_id"], json!(member.user_id));
    }
}
