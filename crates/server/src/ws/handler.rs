use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        RawQuery, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabula_common::protocol::event::{ServerEvent, ANONYMOUS_USERNAME};
use tabula_common::protocol::frame::{
    AppDestination, ChatPayload, CursorPayload, DrawPayload, FrameCommand, JoinPayload,
    LeavePayload,
};
use tabula_common::protocol::topic::Topic;
use tokio::sync::mpsc;
use tracing::debug;

use super::auth as ws_auth;
use super::auth::ConnectionState;
use super::broadcast::BroadcastRouter;
use super::protocol as ws_protocol;
use crate::auth::jwt::{Identity, TokenService};
use crate::error::ErrorCode;
use crate::presence::PresenceRegistry;
use crate::store::{Store, StoreError};
use crate::sync::sequencer::OperationSequencer;

#[derive(Clone)]
pub struct WsState {
    pub store: Store,
    pub sequencer: Arc<OperationSequencer>,
    pub presence: PresenceRegistry,
    pub broadcast: Arc<BroadcastRouter>,
    pub tokens: Arc<TokenService>,
}

pub fn router(state: WsState) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(
    State(state): State<WsState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // The handshake check never blocks the upgrade; it only seeds the
    // connection's session attributes when a valid token is present.
    let session_token =
        ws_auth::handshake_session_token(query.as_deref(), &headers, &state.tokens);

    ws.on_upgrade(move |socket| handle_socket(state, session_token, socket))
}

async fn handle_socket(state: WsState, session_token: Option<String>, mut socket: WebSocket) {
    let mut connection = ConnectionState::with_session_token(session_token);
    let connection_id = connection.connection_id;

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    state.broadcast.register(connection_id, outbound_sender.clone()).await;

    loop {
        tokio::select! {
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(event) => {
                        if ws_protocol::send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_frame)) => {
                        let frame = match ws_protocol::decode_frame(&raw_frame) {
                            Ok(frame) => frame,
                            Err(_) => {
                                let _ = outbound_sender.send(error_event(
                                    ErrorCode::ValidationFailed,
                                    "invalid frame payload",
                                ));
                                continue;
                            }
                        };

                        // The authenticator runs on every inbound frame:
                        // once on the open frame, silently on the rest.
                        match frame.command {
                            FrameCommand::Connect => {
                                ws_auth::authenticate_on_open(&mut connection, &frame, &state.tokens)
                            }
                            _ => {
                                ws_auth::authenticate_on_frame(&mut connection, &frame, &state.tokens)
                            }
                        }

                        match frame.command {
                            FrameCommand::Connect => {
                                let username = connection
                                    .identity()
                                    .map(|identity| identity.username.clone());
                                let _ = outbound_sender.send(ServerEvent::Connected { username });
                            }
                            FrameCommand::Subscribe => {
                                if let Some(error) = handle_subscribe(
                                    &state.broadcast,
                                    connection_id,
                                    frame.destination.as_deref(),
                                )
                                .await
                                {
                                    let _ = outbound_sender.send(error);
                                }
                            }
                            FrameCommand::Send => {
                                let outcome = handle_send_frame(
                                    &state.store,
                                    &state.sequencer,
                                    &state.presence,
                                    connection.identity(),
                                    frame.destination.as_deref(),
                                    frame.body,
                                )
                                .await;

                                match outcome {
                                    SendOutcome::Broadcast { topic, event } => {
                                        let _ = state.broadcast.publish(topic, &event).await;
                                    }
                                    SendOutcome::Reply(event) => {
                                        let _ = outbound_sender.send(event);
                                    }
                                    SendOutcome::Dropped => {
                                        debug!(
                                            connection_id = %connection_id,
                                            "frame dropped without broadcast"
                                        );
                                    }
                                }
                            }
                            FrameCommand::Disconnect => break,
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    // Presence entries are intentionally left behind: only an explicit
    // leave removes them. The router entry must go, though, or fan-out
    // would keep cloning senders into a dead channel.
    state.broadcast.unregister(connection_id).await;
}

#[derive(Debug)]
pub(crate) enum SendOutcome {
    /// Publish the event to every subscriber of the topic.
    Broadcast { topic: Topic, event: ServerEvent },
    /// Deliver an error event to the sender only.
    Reply(ServerEvent),
    /// Silently ignore the frame (no broadcast, no error).
    Dropped,
}

pub(crate) async fn handle_send_frame(
    store: &Store,
    sequencer: &OperationSequencer,
    presence: &PresenceRegistry,
    identity: Option<&Identity>,
    destination: Option<&str>,
    body: Option<Value>,
) -> SendOutcome {
    let Some(destination) = destination.and_then(AppDestination::parse) else {
        return SendOutcome::Reply(error_event(
            ErrorCode::ValidationFailed,
            "unknown send destination",
        ));
    };

    match destination {
        AppDestination::Draw => match parse_body::<DrawPayload>(body) {
            Ok(payload) => handle_draw(store, sequencer, identity, payload).await,
            Err(error) => SendOutcome::Reply(error),
        },
        AppDestination::Join => match parse_body::<JoinPayload>(body) {
            Ok(payload) => match identity {
                Some(identity) => handle_join(presence, identity, payload).await,
                None => SendOutcome::Dropped,
            },
            Err(error) => SendOutcome::Reply(error),
        },
        AppDestination::Leave => match parse_body::<LeavePayload>(body) {
            Ok(payload) => match identity {
                Some(identity) => handle_leave(presence, identity, payload).await,
                None => SendOutcome::Dropped,
            },
            Err(error) => SendOutcome::Reply(error),
        },
        AppDestination::Chat => match parse_body::<ChatPayload>(body) {
            Ok(payload) => handle_chat(store, identity, payload).await,
            Err(error) => SendOutcome::Reply(error),
        },
        AppDestination::Cursor => match parse_body::<CursorPayload>(body) {
            Ok(payload) => handle_cursor(identity, payload),
            Err(error) => SendOutcome::Reply(error),
        },
    }
}

/// Draw frames from authenticated connections are sequenced and
/// persisted before the broadcast; unauthenticated draws are forwarded
/// unattributed and never persisted. That asymmetry is deliberate.
async fn handle_draw(
    store: &Store,
    sequencer: &OperationSequencer,
    identity: Option<&Identity>,
    payload: DrawPayload,
) -> SendOutcome {
    let Some(identity) = identity else {
        return SendOutcome::Broadcast {
            topic: Topic::Draw,
            event: ServerEvent::Draw {
                room_id: payload.room_id,
                op_type: payload.op_type,
                data: payload.data,
                username: None,
                sequence: None,
            },
        };
    };

    match sequencer
        .append(
            store,
            payload.room_id,
            identity.user_id,
            &payload.op_type,
            payload.data.clone(),
        )
        .await
    {
        Ok(record) => SendOutcome::Broadcast {
            topic: Topic::Draw,
            event: ServerEvent::Draw {
                room_id: payload.room_id,
                op_type: payload.op_type,
                data: payload.data,
                username: Some(identity.username.clone()),
                sequence: Some(record.sequence),
            },
        },
        Err(error) => SendOutcome::Reply(store_error_event(error)),
    }
}

async fn handle_join(
    presence: &PresenceRegistry,
    identity: &Identity,
    payload: JoinPayload,
) -> SendOutcome {
    let users = presence.join(payload.room_id, identity.user_id, &identity.username).await;

    SendOutcome::Broadcast {
        topic: Topic::RoomUsers(payload.room_id),
        event: ServerEvent::UserJoined {
            room_id: payload.room_id,
            username: identity.username.clone(),
            users,
        },
    }
}

async fn handle_leave(
    presence: &PresenceRegistry,
    identity: &Identity,
    payload: LeavePayload,
) -> SendOutcome {
    match presence.leave(payload.room_id, identity.user_id).await {
        Some(users) => SendOutcome::Broadcast {
            topic: Topic::RoomUsers(payload.room_id),
            event: ServerEvent::UserLeft {
                room_id: payload.room_id,
                username: identity.username.clone(),
                users,
            },
        },
        // The room never had presence state; nothing to broadcast.
        None => SendOutcome::Dropped,
    }
}

/// Chat is the one handler with a hard authentication requirement.
async fn handle_chat(
    store: &Store,
    identity: Option<&Identity>,
    payload: ChatPayload,
) -> SendOutcome {
    let Some(identity) = identity else {
        return SendOutcome::Reply(error_event(
            ErrorCode::AuthRequired,
            "chat requires authentication",
        ));
    };

    match store.find_room_by_id(payload.room_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return SendOutcome::Reply(error_event(ErrorCode::NotFound, "room not found"));
        }
        Err(error) => return SendOutcome::Reply(store_error_event(error)),
    }

    match store.save_message(payload.room_id, identity.user_id, &payload.content).await {
        Ok(record) => SendOutcome::Broadcast {
            topic: Topic::RoomChat(payload.room_id),
            event: ServerEvent::Chat {
                room_id: payload.room_id,
                username: identity.username.clone(),
                content: record.content,
                timestamp: record.created_at.to_rfc3339(),
            },
        },
        Err(error) => SendOutcome::Reply(store_error_event(error)),
    }
}

/// Cursor frames are always forwarded and never persisted.
fn handle_cursor(identity: Option<&Identity>, payload: CursorPayload) -> SendOutcome {
    let username = identity
        .map(|identity| identity.username.clone())
        .unwrap_or_else(|| ANONYMOUS_USERNAME.to_owned());

    SendOutcome::Broadcast {
        topic: Topic::RoomCursor(payload.room_id),
        event: ServerEvent::Cursor { room_id: payload.room_id, username, x: payload.x, y: payload.y },
    }
}

async fn handle_subscribe(
    broadcast: &BroadcastRouter,
    connection_id: uuid::Uuid,
    destination: Option<&str>,
) -> Option<ServerEvent> {
    let Some(topic) = destination.and_then(|raw| raw.parse::<Topic>().ok()) else {
        return Some(error_event(ErrorCode::ValidationFailed, "unknown subscribe destination"));
    };

    if !broadcast.subscribe(connection_id, topic).await {
        return Some(error_event(ErrorCode::InternalError, "connection is not registered"));
    }

    None
}

fn parse_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T, ServerEvent> {
    let body =
        body.ok_or_else(|| error_event(ErrorCode::ValidationFailed, "missing frame body"))?;
    serde_json::from_value(body)
        .map_err(|_| error_event(ErrorCode::ValidationFailed, "malformed frame body"))
}

fn error_event(code: ErrorCode, message: impl Into<String>) -> ServerEvent {
    ServerEvent::Error { code: code.as_str().to_owned(), message: message.into() }
}

fn store_error_event(error: StoreError) -> ServerEvent {
    match error {
        StoreError::NotFound(what) => error_event(ErrorCode::NotFound, format!("{what} not found")),
        StoreError::Conflict(message) => error_event(ErrorCode::Conflict, message),
        StoreError::Database(error) => {
            tracing::error!(error = ?error, "store failure while handling frame");
            error_event(ErrorCode::InternalError, ErrorCode::InternalError.default_message())
        }
    }
}
