// In-memory half of the store dispatch. Backs tests and database-less
// local runs; must mirror the PostgreSQL variant's semantics, including
// the unique (room, sequence) constraint and foreign-key checks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    MessageRecord, OperationRecord, RoomRecord, SnapshotRecord, StoreError, StoreResult,
    UserRecord,
};

#[derive(Default)]
pub struct MemoryStore {
    users: HashMap<Uuid, UserRecord>,
    rooms: HashMap<Uuid, MemoryRoom>,
    operations: Vec<OperationRecord>,
    messages: Vec<MessageRecord>,
    snapshots: Vec<SnapshotRecord>,
}

#[derive(Clone)]
struct MemoryRoom {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    created_at: chrono::DateTime<Utc>,
}

impl MemoryStore {
    fn room_record(&self, room: &MemoryRoom) -> StoreResult<RoomRecord> {
        let owner =
            self.users.get(&room.owner_id).ok_or(StoreError::NotFound("referenced row"))?;

        Ok(RoomRecord {
            id: room.id,
            name: room.name.clone(),
            owner_id: room.owner_id,
            owner_username: owner.username.clone(),
            created_at: room.created_at,
        })
    }
}

pub(super) async fn create_user(
    store: &Arc<RwLock<MemoryStore>>,
    username: &str,
    password_hash: &str,
    email: Option<&str>,
) -> StoreResult<UserRecord> {
    let mut guard = store.write().await;

    if guard.users.values().any(|user| user.username == username) {
        return Err(StoreError::Conflict("resource already exists"));
    }
    if let Some(email) = email {
        if guard.users.values().any(|user| user.email.as_deref() == Some(email)) {
            return Err(StoreError::Conflict("resource already exists"));
        }
    }

    let record = UserRecord {
        id: Uuid::new_v4(),
        username: username.to_owned(),
        password_hash: password_hash.to_owned(),
        email: email.map(ToOwned::to_owned),
        created_at: Utc::now(),
    };
    guard.users.insert(record.id, record.clone());

    Ok(record)
}

pub(super) async fn find_user_by_username(
    store: &Arc<RwLock<MemoryStore>>,
    username: &str,
) -> StoreResult<Option<UserRecord>> {
    let guard = store.read().await;
    Ok(guard.users.values().find(|user| user.username == username).cloned())
}

pub(super) async fn find_user_by_id(
    store: &Arc<RwLock<MemoryStore>>,
    user_id: Uuid,
) -> StoreResult<Option<UserRecord>> {
    let guard = store.read().await;
    Ok(guard.users.get(&user_id).cloned())
}

pub(super) async fn create_room(
    store: &Arc<RwLock<MemoryStore>>,
    name: &str,
    owner_id: Uuid,
) -> StoreResult<RoomRecord> {
    let mut guard = store.write().await;

    if !guard.users.contains_key(&owner_id) {
        return Err(StoreError::NotFound("referenced row"));
    }

    let room = MemoryRoom {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        owner_id,
        created_at: Utc::now(),
    };
    let record = guard.room_record(&room)?;
    guard.rooms.insert(room.id, room);

    Ok(record)
}

pub(super) async fn find_room_by_id(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
) -> StoreResult<Option<RoomRecord>> {
    let guard = store.read().await;
    match guard.rooms.get(&room_id) {
        Some(room) => Ok(Some(guard.room_record(room)?)),
        None => Ok(None),
    }
}

pub(super) async fn list_rooms(store: &Arc<RwLock<MemoryStore>>) -> StoreResult<Vec<RoomRecord>> {
    let guard = store.read().await;
    let mut records = guard
        .rooms
        .values()
        .map(|room| guard.room_record(room))
        .collect::<StoreResult<Vec<_>>>()?;
    records.sort_by_key(|record| (record.created_at, record.id));

    Ok(records)
}

pub(super) async fn append_operation(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
    author_id: Uuid,
    op_type: &str,
    payload: Value,
    sequence: i64,
) -> StoreResult<OperationRecord> {
    let mut guard = store.write().await;

    if !guard.rooms.contains_key(&room_id) || !guard.users.contains_key(&author_id) {
        return Err(StoreError::NotFound("referenced row"));
    }
    if guard
        .operations
        .iter()
        .any(|operation| operation.room_id == room_id && operation.sequence == sequence)
    {
        return Err(StoreError::Conflict("resource already exists"));
    }

    let record = OperationRecord {
        id: Uuid::new_v4(),
        room_id,
        author_id,
        op_type: op_type.to_owned(),
        payload,
        sequence,
        created_at: Utc::now(),
    };
    guard.operations.push(record.clone());

    Ok(record)
}

pub(super) async fn list_operations(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
) -> StoreResult<Vec<OperationRecord>> {
    let guard = store.read().await;
    let mut operations: Vec<OperationRecord> = guard
        .operations
        .iter()
        .filter(|operation| operation.room_id == room_id)
        .cloned()
        .collect();
    operations.sort_by_key(|operation| operation.sequence);

    Ok(operations)
}

pub(super) async fn last_operation(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
) -> StoreResult<Option<OperationRecord>> {
    let guard = store.read().await;
    Ok(guard
        .operations
        .iter()
        .filter(|operation| operation.room_id == room_id)
        .max_by_key(|operation| operation.sequence)
        .cloned())
}

pub(super) async fn save_message(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
    author_id: Uuid,
    content: &str,
) -> StoreResult<MessageRecord> {
    let mut guard = store.write().await;

    if !guard.rooms.contains_key(&room_id) {
        return Err(StoreError::NotFound("referenced row"));
    }
    let author_username = guard
        .users
        .get(&author_id)
        .map(|user| user.username.clone())
        .ok_or(StoreError::NotFound("referenced row"))?;

    let record = MessageRecord {
        id: Uuid::new_v4(),
        room_id,
        author_id,
        author_username,
        content: content.to_owned(),
        created_at: Utc::now(),
    };
    guard.messages.push(record.clone());

    Ok(record)
}

pub(super) async fn list_messages(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
) -> StoreResult<Vec<MessageRecord>> {
    let guard = store.read().await;
    Ok(guard
        .messages
        .iter()
        .filter(|message| message.room_id == room_id)
        .cloned()
        .collect())
}

pub(super) async fn save_snapshot(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
    image_data: &str,
) -> StoreResult<SnapshotRecord> {
    let mut guard = store.write().await;

    if !guard.rooms.contains_key(&room_id) {
        return Err(StoreError::NotFound("referenced row"));
    }

    let record = SnapshotRecord {
        id: Uuid::new_v4(),
        room_id,
        image_data: image_data.to_owned(),
        created_at: Utc::now(),
    };
    guard.snapshots.push(record.clone());

    Ok(record)
}

pub(super) async fn latest_snapshot(
    store: &Arc<RwLock<MemoryStore>>,
    room_id: Uuid,
) -> StoreResult<Option<SnapshotRecord>> {
    let guard = store.read().await;
    // Insertion order breaks created_at ties, matching the DB's
    // newest-row-wins ordering.
    Ok(guard.snapshots.iter().rev().find(|snapshot| snapshot.room_id == room_id).cloned())
}
