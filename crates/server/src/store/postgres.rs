// PostgreSQL half of the store dispatch.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    MessageRecord, OperationRecord, RoomRecord, SnapshotRecord, StoreError, StoreResult,
    UserRecord,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    owner_username: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: Uuid,
    room_id: Uuid,
    author_id: Uuid,
    op_type: String,
    payload: Value,
    sequence: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    room_id: Uuid,
    author_id: Uuid,
    author_username: String,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    room_id: Uuid,
    image_data: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(value: UserRow) -> Self {
        Self {
            id: value.id,
            username: value.username,
            password_hash: value.password_hash,
            email: value.email,
            created_at: value.created_at,
        }
    }
}

impl From<RoomRow> for RoomRecord {
    fn from(value: RoomRow) -> Self {
        Self {
            id: value.id,
            name: value.name,
            owner_id: value.owner_id,
            owner_username: value.owner_username,
            created_at: value.created_at,
        }
    }
}

impl From<OperationRow> for OperationRecord {
    fn from(value: OperationRow) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            author_id: value.author_id,
            op_type: value.op_type,
            payload: value.payload,
            sequence: value.sequence,
            created_at: value.created_at,
        }
    }
}

impl From<MessageRow> for MessageRecord {
    fn from(value: MessageRow) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            author_id: value.author_id,
            author_username: value.author_username,
            content: value.content,
            created_at: value.created_at,
        }
    }
}

impl From<SnapshotRow> for SnapshotRecord {
    fn from(value: SnapshotRow) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            image_data: value.image_data,
            created_at: value.created_at,
        }
    }
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref database_error) = error {
        match database_error.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict("resource already exists"),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::NotFound("referenced row"),
            _ => {}
        }
    }

    StoreError::Database(anyhow!(error))
}

pub(super) async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    email: Option<&str>,
) -> StoreResult<UserRecord> {
    sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, username, password_hash, email)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, password_hash, email, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(password_hash)
    .bind(email)
    .fetch_one(pool)
    .await
    .map(UserRecord::from)
    .map_err(map_sqlx_error)
}

pub(super) async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> StoreResult<Option<UserRecord>> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, password_hash, email, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(UserRecord::from))
    .map_err(map_sqlx_error)
}

pub(super) async fn find_user_by_id(
    pool: &PgPool,
    user_id: Uuid,
) -> StoreResult<Option<UserRecord>> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, password_hash, email, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(UserRecord::from))
    .map_err(map_sqlx_error)
}

pub(super) async fn create_room(
    pool: &PgPool,
    name: &str,
    owner_id: Uuid,
) -> StoreResult<RoomRecord> {
    sqlx::query_as::<_, RoomRow>(
        r#"
        WITH inserted AS (
            INSERT INTO rooms (id, name, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_id, created_at
        )
        SELECT i.id, i.name, i.owner_id, u.username AS owner_username, i.created_at
        FROM inserted AS i
        INNER JOIN users AS u ON u.id = i.owner_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .map(RoomRecord::from)
    .map_err(map_sqlx_error)
}

pub(super) async fn find_room_by_id(
    pool: &PgPool,
    room_id: Uuid,
) -> StoreResult<Option<RoomRecord>> {
    sqlx::query_as::<_, RoomRow>(
        r#"
        SELECT r.id, r.name, r.owner_id, u.username AS owner_username, r.created_at
        FROM rooms AS r
        INNER JOIN users AS u ON u.id = r.owner_id
        WHERE r.id = $1
        "#,
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(RoomRecord::from))
    .map_err(map_sqlx_error)
}

pub(super) async fn list_rooms(pool: &PgPool) -> StoreResult<Vec<RoomRecord>> {
    sqlx::query_as::<_, RoomRow>(
        r#"
        SELECT r.id, r.name, r.owner_id, u.username AS owner_username, r.created_at
        FROM rooms AS r
        INNER JOIN users AS u ON u.id = r.owner_id
        ORDER BY r.created_at ASC, r.id ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map(|rows| rows.into_iter().map(RoomRecord::from).collect())
    .map_err(map_sqlx_error)
}

pub(super) async fn append_operation(
    pool: &PgPool,
    room_id: Uuid,
    author_id: Uuid,
    op_type: &str,
    payload: Value,
    sequence: i64,
) -> StoreResult<OperationRecord> {
    sqlx::query_as::<_, OperationRow>(
        r#"
        INSERT INTO operations (id, room_id, author_id, op_type, payload, sequence)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, room_id, author_id, op_type, payload, sequence, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(room_id)
    .bind(author_id)
    .bind(op_type)
    .bind(payload)
    .bind(sequence)
    .fetch_one(pool)
    .await
    .map(OperationRecord::from)
    .map_err(map_sqlx_error)
}

pub(super) async fn list_operations(
    pool: &PgPool,
    room_id: Uuid,
) -> StoreResult<Vec<OperationRecord>> {
    sqlx::query_as::<_, OperationRow>(
        r#"
        SELECT id, room_id, author_id, op_type, payload, sequence, created_at
        FROM operations
        WHERE room_id = $1
        ORDER BY sequence ASC
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await
    .map(|rows| rows.into_iter().map(OperationRecord::from).collect())
    .map_err(map_sqlx_error)
}

pub(super) async fn last_operation(
    pool: &PgPool,
    room_id: Uuid,
) -> StoreResult<Option<OperationRecord>> {
    sqlx::query_as::<_, OperationRow>(
        r#"
        SELECT id, room_id, author_id, op_type, payload, sequence, created_at
        FROM operations
        WHERE room_id = $1
        ORDER BY sequence DESC
        LIMIT 1
        "#,
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(OperationRecord::from))
    .map_err(map_sqlx_error)
}

pub(super) async fn save_message(
    pool: &PgPool,
    room_id: Uuid,
    author_id: Uuid,
    content: &str,
) -> StoreResult<MessageRecord> {
    sqlx::query_as::<_, MessageRow>(
        r#"
        WITH inserted AS (
            INSERT INTO messages (id, room_id, author_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, room_id, author_id, content, created_at
        )
        SELECT i.id, i.room_id, i.author_id, u.username AS author_username, i.content, i.created_at
        FROM inserted AS i
        INNER JOIN users AS u ON u.id = i.author_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(room_id)
    .bind(author_id)
    .bind(content)
    .fetch_one(pool)
    .await
    .map(MessageRecord::from)
    .map_err(map_sqlx_error)
}

pub(super) async fn list_messages(
    pool: &PgPool,
    room_id: Uuid,
) -> StoreResult<Vec<MessageRecord>> {
    sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT m.id, m.room_id, m.author_id, u.username AS author_username, m.content, m.created_at
        FROM messages AS m
        INNER JOIN users AS u ON u.id = m.author_id
        WHERE m.room_id = $1
        ORDER BY m.created_at ASC, m.id ASC
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await
    .map(|rows| rows.into_iter().map(MessageRecord::from).collect())
    .map_err(map_sqlx_error)
}

pub(super) async fn save_snapshot(
    pool: &PgPool,
    room_id: Uuid,
    image_data: &str,
) -> StoreResult<SnapshotRecord> {
    sqlx::query_as::<_, SnapshotRow>(
        r#"
        INSERT INTO snapshots (id, room_id, image_data)
        VALUES ($1, $2, $3)
        RETURNING id, room_id, image_data, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(room_id)
    .bind(image_data)
    .fetch_one(pool)
    .await
    .map(SnapshotRecord::from)
    .map_err(map_sqlx_error)
}

pub(super) async fn latest_snapshot(
    pool: &PgPool,
    room_id: Uuid,
) -> StoreResult<Option<SnapshotRecord>> {
    sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT id, room_id, image_data, created_at
        FROM snapshots
        WHERE room_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(SnapshotRecord::from))
    .map_err(map_sqlx_error)
}
