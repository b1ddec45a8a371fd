// Presence tracking (who is currently in each room).
//
// One shard per room: the outer map hands out `Arc<Mutex<..>>` handles so
// join/leave for the same room serialize while different rooms proceed in
// parallel. The member snapshot returned by a mutation is taken under the
// same room lock, so the broadcast a caller builds from it can never
// interleave with a concurrent mutation of that room.
//
// Entries are removed only by an explicit leave; a connection that drops
// without leaving goes stale until the user rejoins or leaves later.

use std::collections::HashMap;
use std::sync::Arc;

use tabula_common::protocol::event::RoomMember;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

type RoomShard = Arc<Mutex<HashMap<Uuid, RoomMember>>>;

#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, RoomShard>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the member's presence entry and return the
    /// room's full member list.
    pub async fn join(&self, room_id: Uuid, user_id: Uuid, username: &str) -> Vec<RoomMember> {
        let shard = self.shard_for_room(room_id).await;
        let mut members = shard.lock().await;
        members.insert(user_id, RoomMember { user_id, username: username.to_owned() });
        snapshot(&members)
    }

    /// Remove the member's entry and return the remaining member list.
    /// `None` when the room has no presence state at all — callers treat
    /// that as a no-op and broadcast nothing.
    pub async fn leave(&self, room_id: Uuid, user_id: Uuid) -> Option<Vec<RoomMember>> {
        let shard = self.rooms.read().await.get(&room_id).cloned()?;
        let mut members = shard.lock().await;
        members.remove(&user_id);
        Some(snapshot(&members))
    }

    /// Current member list for a room (empty when unknown).
    pub async fn members(&self, room_id: Uuid) -> Vec<RoomMember> {
        let Some(shard) = self.rooms.read().await.get(&room_id).cloned() else {
            return Vec::new();
        };
        let members = shard.lock().await;
        snapshot(&members)
    }

    async fn shard_for_room(&self, room_id: Uuid) -> RoomShard {
        if let Some(existing) = self.rooms.read().await.get(&room_id).cloned() {
            return existing;
        }

        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id).or_default().clone()
    }
}

fn snapshot(members: &HashMap<Uuid, RoomMember>) -> Vec<RoomMember> {
    let mut list: Vec<RoomMember> = members.values().cloned().collect();
    list.sort_by(|a, b| a.username.cmp(&b.username));
    list
}

#[cfg(test)]
mod tests {
    use super::PresenceRegistry;
    use uuid::Uuid;

    fn room_a() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-00000000000a").unwrap()
    }

    fn room_b() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-00000000000b").unwrap()
    }

    #[tokio::test]
    async fn join_returns_the_full_member_list() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let after_alice = registry.join(room_a(), alice, "alice").await;
        assert_eq!(after_alice.len(), 1);

        let after_bob = registry.join(room_a(), bob, "bob").await;
        let names: Vec<&str> = after_bob.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn rejoin_overwrites_instead_of_duplicating() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();

        registry.join(room_a(), alice, "alice").await;
        let after_rejoin = registry.join(room_a(), alice, "alice").await;
        assert_eq!(after_rejoin.len(), 1);
    }

    #[tokio::test]
    async fn join_then_leave_restores_the_prior_member_set() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        registry.join(room_a(), alice, "alice").await;
        let before = registry.members(room_a()).await;

        registry.join(room_a(), bob, "bob").await;
        let after_leave =
            registry.leave(room_a(), bob).await.expect("room should have presence state");

        assert_eq!(after_leave, before);
    }

    #[tokio::test]
    async fn leave_from_an_unknown_room_is_a_noop() {
        let registry = PresenceRegistry::new();
        assert!(registry.leave(room_a(), Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn leave_by_an_absent_member_returns_the_unchanged_list() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();

        registry.join(room_a(), alice, "alice").await;
        let members = registry
            .leave(room_a(), Uuid::new_v4())
            .await
            .expect("room should have presence state");
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();

        registry.join(room_a(), alice, "alice").await;
        assert!(registry.members(room_b()).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_joins_all_land() {
        let registry = PresenceRegistry::new();

        let mut tasks = Vec::new();
        for index in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.join(room_a(), Uuid::new_v4(), &format!("user-{index}")).await
            }));
        }
        for task in tasks {
            task.await.expect("join task should not panic");
        }

        assert_eq!(registry.members(room_a()).await.len(), 16);
    }
}
