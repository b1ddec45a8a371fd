// REST surface: auth, rooms, catch-up, chat history, and snapshots.
//
// Every handler is a thin pass-through to the store (or the sequencer
// for catch-up queries); the real-time semantics live behind the
// WebSocket dispatcher, not here.

pub mod auth;
pub mod rooms;

use std::sync::Arc;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::{
    auth::{jwt::TokenService, middleware::require_bearer_auth},
    error::{ErrorCode, ServerError},
    store::{Store, StoreError},
    sync::sequencer::OperationSequencer,
};

const MAX_USERNAME_CHARS: usize = 32;
const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 8;
const MAX_ROOM_NAME_CHARS: usize = 100;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub tokens: Arc<TokenService>,
    pub sequencer: Arc<OperationSequencer>,
}

pub fn build_router(state: ApiState) -> Router {
    let auth_layer =
        middleware::from_fn_with_state(Arc::clone(&state.tokens), require_bearer_auth);

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/rooms", post(rooms::create_room).route_layer(auth_layer.clone()))
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/rooms/{room_id}", get(rooms::get_room))
        .route("/api/rooms/{room_id}/operations", get(rooms::get_operations))
        .route("/api/rooms/{room_id}/messages", get(rooms::get_messages))
        .route("/api/rooms/{room_id}/snapshot", post(rooms::save_snapshot).route_layer(auth_layer))
        .route("/api/rooms/{room_id}/snapshot", get(rooms::get_snapshot))
        .with_state(state)
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest { message: String },
    Unauthorized { message: &'static str },
    NotFound { message: &'static str },
    Conflict { message: &'static str },
    Internal(anyhow::Error),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    pub(crate) fn unauthorized(message: &'static str) -> Self {
        Self::Unauthorized { message }
    }

    pub(crate) fn not_found(message: &'static str) -> Self {
        Self::NotFound { message }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => Self::NotFound { message: "requested resource not found" },
            StoreError::Conflict(message) => Self::Conflict { message },
            StoreError::Database(error) => Self::Internal(error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest { message } => {
                ServerError::new(ErrorCode::ValidationFailed, message).into_response()
            }
            Self::Unauthorized { message } => {
                ServerError::new(ErrorCode::AuthInvalidCredentials, message).into_response()
            }
            Self::NotFound { message } => {
                ServerError::new(ErrorCode::NotFound, message).into_response()
            }
            Self::Conflict { message } => {
                ServerError::new(ErrorCode::Conflict, message).into_response()
            }
            Self::Internal(error) => {
                tracing::error!(error = ?error, "api internal error");
                ServerError::from_code(ErrorCode::InternalError).into_response()
            }
        }
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    let length = username.chars().count();
    if length < MIN_USERNAME_CHARS || length > MAX_USERNAME_CHARS {
        return Err(ApiError::bad_request(format!(
            "username must be between {MIN_USERNAME_CHARS} and {MAX_USERNAME_CHARS} characters"
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits, '_' and '-'",
        ));
    }

    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    Ok(())
}

pub(crate) fn validate_room_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("room name must not be empty"));
    }
    if trimmed.chars().count() > MAX_ROOM_NAME_CHARS {
        return Err(ApiError::bad_request(format!(
            "room name must be at most {MAX_ROOM_NAME_CHARS} characters"
        )));
    }

    Ok(())
}
