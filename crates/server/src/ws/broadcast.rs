// Topic-based fan-out to connected clients.
//
// Delivery is best-effort to currently subscribed connections: a closed
// receiver is skipped, and nothing is buffered or replayed at this layer.
// Durability for drawing operations lives in the sequencer's persisted
// log, which clients re-fetch through the catch-up endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tabula_common::protocol::event::ServerEvent;
use tabula_common::protocol::topic::Topic;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

struct Subscriber {
    sender: mpsc::UnboundedSender<ServerEvent>,
    topics: HashSet<Topic>,
}

#[derive(Default)]
pub struct BroadcastRouter {
    connections: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel. Subscriptions start
    /// empty.
    pub async fn register(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) {
        let mut guard = self.connections.write().await;
        guard.insert(connection_id, Subscriber { sender, topics: HashSet::new() });
    }

    /// Drop a connection and all its subscriptions.
    pub async fn unregister(&self, connection_id: Uuid) {
        let mut guard = self.connections.write().await;
        guard.remove(&connection_id);
    }

    /// Subscribe a registered connection to a topic. Returns false for
    /// unknown connections.
    pub async fn subscribe(&self, connection_id: Uuid, topic: Topic) -> bool {
        let mut guard = self.connections.write().await;
        match guard.get_mut(&connection_id) {
            Some(subscriber) => {
                subscriber.topics.insert(topic);
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every subscriber of a topic. Returns the
    /// number of connections it reached.
    pub async fn publish(&self, topic: Topic, event: &ServerEvent) -> usize {
        let recipients: Vec<mpsc::UnboundedSender<ServerEvent>> = {
            let guard = self.connections.read().await;
            guard
                .values()
                .filter(|subscriber| subscriber.topics.contains(&topic))
                .map(|subscriber| subscriber.sender.clone())
                .collect()
        };

        let mut sent_count = 0;
        for recipient in recipients {
            if recipient.send(event.clone()).is_ok() {
                sent_count += 1;
            }
        }

        sent_count
    }
}
