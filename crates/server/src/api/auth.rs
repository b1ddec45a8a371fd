use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tabula_common::types::AuthResponse;
use tracing::info;

use crate::auth::password::{hash_password, verify_password};

use super::{validate_password, validate_username, ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub(super) async fn register(
    State(state): State<ApiState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    let password_hash = hash_password(&payload.password).map_err(ApiError::Internal)?;
    let user = state
        .store
        .create_user(&payload.username, &password_hash, payload.email.as_deref())
        .await?;

    let token = state.tokens.issue(user.id, &user.username).map_err(ApiError::Internal)?;
    info!(username = %user.username, "user registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, username: user.username })))
}

pub(super) async fn login(
    State(state): State<ApiState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_username(&payload.username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid username or password"))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::unauthorized("invalid username or password"));
    }

    let token = state.tokens.issue(user.id, &user.username).map_err(ApiError::Internal)?;

    Ok(Json(AuthResponse { token, username: user.username }))
}
