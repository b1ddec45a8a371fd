// Per-room operation sequencing.
//
// Sequence numbers are contiguous from 1 within a room. The room's mutex
// is held across the whole read-max / assign / persist step, and the
// in-memory counter only advances after the store accepts the row:
// a failed persist leaves the counter untouched, so the next append
// reuses the number and the log stays gapless. Rooms sequence
// independently; appends to different rooms never contend.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::store::{OperationRecord, Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct RoomCounter {
    /// Highest sequence durably assigned, `None` until seeded from the
    /// store on first use after startup.
    last_assigned: Option<i64>,
}

#[derive(Debug, Default)]
pub struct OperationSequencer {
    counters: RwLock<HashMap<Uuid, Arc<Mutex<RoomCounter>>>>,
}

impl OperationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequence number for the room and persist the
    /// operation under it. Rejected without consuming a number when the
    /// room does not exist.
    pub async fn append(
        &self,
        store: &Store,
        room_id: Uuid,
        author_id: Uuid,
        op_type: &str,
        payload: Value,
    ) -> StoreResult<OperationRecord> {
        async move {
            if store.find_room_by_id(room_id).await?.is_none() {
                return Err(StoreError::NotFound("room"));
            }

            let counter = self.counter_for_room(room_id).await;
            let mut guard = counter.lock().await;

            let last = match guard.last_assigned {
                Some(sequence) => sequence,
                None => store
                    .last_operation(room_id)
                    .await?
                    .map(|operation| operation.sequence)
                    .unwrap_or(0),
            };
            let next = last + 1;

            let record =
                store.append_operation(room_id, author_id, op_type, payload, next).await?;
            guard.last_assigned = Some(next);

            Ok(record)
        }
        .instrument(info_span!(
            "sequencer.append",
            room_id = %room_id,
            author_id = %author_id,
            op_type,
        ))
        .await
    }

    /// Catch-up query: operations with sequence strictly greater than
    /// `after_sequence`, ascending. `after_sequence <= 0` returns the
    /// full history.
    pub async fn list_since(
        &self,
        store: &Store,
        room_id: Uuid,
        after_sequence: i64,
    ) -> StoreResult<Vec<OperationRecord>> {
        if store.find_room_by_id(room_id).await?.is_none() {
            return Err(StoreError::NotFound("room"));
        }

        let operations = store.list_operations(room_id).await?;
        if after_sequence <= 0 {
            return Ok(operations);
        }

        Ok(operations
            .into_iter()
            .filter(|operation| operation.sequence > after_sequence)
            .collect())
    }

    async fn counter_for_room(&self, room_id: Uuid) -> Arc<Mutex<RoomCounter>> {
        if let Some(existing) = self.counters.read().await.get(&room_id).cloned() {
            return existing;
        }

        let mut counters = self.counters.write().await;
        counters.entry(room_id).or_default().clone()
    }
}
