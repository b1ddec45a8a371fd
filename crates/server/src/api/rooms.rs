use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tabula_common::types::{ChatHistoryEntry, OperationEntry, RoomSummary};
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::store::RoomRecord;

use super::{validate_room_name, ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRoomRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRoomResponse {
    pub room_id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationsQuery {
    #[serde(default)]
    pub after_sequence: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveSnapshotRequest {
    pub image_data: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SnapshotSavedResponse {
    pub saved: bool,
}

/// Snapshot fetch mirrors the store's "latest or nothing" contract with
/// empty strings rather than a 404 when no snapshot exists yet.
#[derive(Debug, Serialize)]
pub(crate) struct SnapshotResponse {
    pub image_data: String,
    pub created_at: String,
}

fn into_summary(record: RoomRecord) -> RoomSummary {
    RoomSummary { room_id: record.id, name: record.name, owner: record.owner_username }
}

pub(super) async fn create_room(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    validate_room_name(&payload.name)?;

    let room = state.store.create_room(payload.name.trim(), user.user_id).await?;

    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room_id: room.id, name: room.name })))
}

pub(super) async fn get_room(
    State(state): State<ApiState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSummary>, ApiError> {
    let room = state
        .store
        .find_room_by_id(room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("room not found"))?;

    Ok(Json(into_summary(room)))
}

pub(super) async fn list_rooms(
    State(state): State<ApiState>,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    let rooms = state.store.list_rooms().await?;

    Ok(Json(rooms.into_iter().map(into_summary).collect()))
}

/// The catch-up primitive: operations with sequence strictly greater
/// than `after_sequence`, ascending. Absent or non-positive values
/// return the full history.
pub(super) async fn get_operations(
    State(state): State<ApiState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<OperationsQuery>,
) -> Result<Json<Vec<OperationEntry>>, ApiError> {
    let operations = state
        .sequencer
        .list_since(&state.store, room_id, query.after_sequence.unwrap_or(0))
        .await?;

    Ok(Json(
        operations
            .into_iter()
            .map(|operation| OperationEntry {
                op_type: operation.op_type,
                data: operation.payload,
                sequence: operation.sequence,
            })
            .collect(),
    ))
}

pub(super) async fn get_messages(
    State(state): State<ApiState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<ChatHistoryEntry>>, ApiError> {
    if state.store.find_room_by_id(room_id).await?.is_none() {
        return Err(ApiError::not_found("room not found"));
    }

    let messages = state.store.list_messages(room_id).await?;

    Ok(Json(
        messages
            .into_iter()
            .map(|message| ChatHistoryEntry {
                username: message.author_username,
                content: message.content,
                timestamp: message.created_at,
            })
            .collect(),
    ))
}

pub(super) async fn save_snapshot(
    State(state): State<ApiState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SaveSnapshotRequest>,
) -> Result<(StatusCode, Json<SnapshotSavedResponse>), ApiError> {
    if payload.image_data.is_empty() {
        return Err(ApiError::bad_request("image data is required"));
    }
    if state.store.find_room_by_id(room_id).await?.is_none() {
        return Err(ApiError::not_found("room not found"));
    }

    state.store.save_snapshot(room_id, &payload.image_data).await?;

    Ok((StatusCode::CREATED, Json(SnapshotSavedResponse { saved: true })))
}

pub(super) async fn get_snapshot(
    State(state): State<ApiState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    if state.store.find_room_by_id(room_id).await?.is_none() {
        return Err(ApiError::not_found("room not found"));
    }

    let response = match state.store.latest_snapshot(room_id).await? {
        Some(snapshot) => SnapshotResponse {
            image_data: snapshot.image_data,
            created_at: snapshot.created_at.to_rfc3339(),
        },
        None => SnapshotResponse { image_data: String::new(), created_at: String::new() },
    };

    Ok(Json(response))
}
