// Persistence collaborator for users, rooms, operations, messages, and
// snapshots.
//
// `Store` dispatches every operation to either a PostgreSQL pool or an
// in-memory map store. The memory variant backs tests and local runs
// without a database; both variants must agree on semantics (uniqueness,
// ordering, not-found behavior) since the sequencer and the frame
// dispatcher are written against this boundary, not against SQL.

mod memory;
mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub created_at: DateTime<Utc>,
}

/// One persisted drawing operation. Immutable once written.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub op_type: String,
    pub payload: Value,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub image_data: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryStore>>),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryStore::default())))
    }

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        email: Option<&str>,
    ) -> StoreResult<UserRecord> {
        match self {
            Self::Postgres(pool) => postgres::create_user(pool, username, password_hash, email).await,
            Self::Memory(store) => {
                memory::create_user(store, username, password_hash, email).await
            }
        }
    }

    pub async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_user_by_username(pool, username).await,
            Self::Memory(store) => memory::find_user_by_username(store, username).await,
        }
    }

    pub async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_user_by_id(pool, user_id).await,
            Self::Memory(store) => memory::find_user_by_id(store, user_id).await,
        }
    }

    pub async fn create_room(&self, name: &str, owner_id: Uuid) -> StoreResult<RoomRecord> {
        match self {
            Self::Postgres(pool) => postgres::create_room(pool, name, owner_id).await,
            Self::Memory(store) => memory::create_room(store, name, owner_id).await,
        }
    }

    pub async fn find_room_by_id(&self, room_id: Uuid) -> StoreResult<Option<RoomRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_room_by_id(pool, room_id).await,
            Self::Memory(store) => memory::find_room_by_id(store, room_id).await,
        }
    }

    pub async fn list_rooms(&self) -> StoreResult<Vec<RoomRecord>> {
        match self {
            Self::Postgres(pool) => postgres::list_rooms(pool).await,
            Self::Memory(store) => memory::list_rooms(store).await,
        }
    }

    /// Persist one operation with its pre-assigned sequence number.
    /// A sequence collision surfaces as `Conflict` — the sequencer holds
    /// the room lock, so hitting this means the invariant was violated
    /// upstream.
    pub async fn append_operation(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        op_type: &str,
        payload: Value,
        sequence: i64,
    ) -> StoreResult<OperationRecord> {
        match self {
            Self::Postgres(pool) => {
                postgres::append_operation(pool, room_id, author_id, op_type, payload, sequence)
                    .await
            }
            Self::Memory(store) => {
                memory::append_operation(store, room_id, author_id, op_type, payload, sequence)
                    .await
            }
        }
    }

    /// All operations for a room, ascending by sequence.
    pub async fn list_operations(&self, room_id: Uuid) -> StoreResult<Vec<OperationRecord>> {
        match self {
            Self::Postgres(pool) => postgres::list_operations(pool, room_id).await,
            Self::Memory(store) => memory::list_operations(store, room_id).await,
        }
    }

    /// The highest-sequence operation for a room, if any.
    pub async fn last_operation(&self, room_id: Uuid) -> StoreResult<Option<OperationRecord>> {
        match self {
            Self::Postgres(pool) => postgres::last_operation(pool, room_id).await,
            Self::Memory(store) => memory::last_operation(store, room_id).await,
        }
    }

    pub async fn save_message(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> StoreResult<MessageRecord> {
        match self {
            Self::Postgres(pool) => postgres::save_message(pool, room_id, author_id, content).await,
            Self::Memory(store) => memory::save_message(store, room_id, author_id, content).await,
        }
    }

    /// All messages for a room, ascending by timestamp.
    pub async fn list_messages(&self, room_id: Uuid) -> StoreResult<Vec<MessageRecord>> {
        match self {
            Self::Postgres(pool) => postgres::list_messages(pool, room_id).await,
            Self::Memory(store) => memory::list_messages(store, room_id).await,
        }
    }

    pub async fn save_snapshot(
        &self,
        room_id: Uuid,
        image_data: &str,
    ) -> StoreResult<SnapshotRecord> {
        match self {
            Self::Postgres(pool) => postgres::save_snapshot(pool, room_id, image_data).await,
            Self::Memory(store) => memory::save_snapshot(store, room_id, image_data).await,
        }
    }

    pub async fn latest_snapshot(&self, room_id: Uuid) -> StoreResult<Option<SnapshotRecord>> {
        match self {
            Self::Postgres(pool) => postgres::latest_snapshot(pool, room_id).await,
            Self::Memory(store) => memory::latest_snapshot(store, room_id).await,
        }
    }
}
