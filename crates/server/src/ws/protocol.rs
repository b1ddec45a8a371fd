use axum::extract::ws::{Message, WebSocket};
use tabula_common::protocol::event::ServerEvent;
use tabula_common::protocol::frame::ClientFrame;

pub fn decode_frame(raw: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str::<ClientFrame>(raw)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let encoded = encode_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::{decode_frame, encode_event};
    use tabula_common::protocol::event::ServerEvent;
    use tabula_common::protocol::frame::FrameCommand;

    #[test]
    fn decodes_a_minimal_connect_frame() {
        let frame = decode_frame(r#"{"command":"connect"}"#).expect("frame should decode");
        assert_eq!(frame.command, FrameCommand::Connect);
    }

    #[test]
    fn rejects_non_frame_payloads() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"commands":"connect"}"#).is_err());
    }

    #[test]
    fn encodes_events_as_single_line_json() {
        let encoded = encode_event(&ServerEvent::Connected { username: None })
            .expect("event should encode");
        assert!(encoded.contains(r#""type":"connected""#));
        assert!(!encoded.contains('\n'));
    }
}
