//! Per-list fan-out of list state.
//!
//! Each list id with at least one subscriber gets a [`BroadcastGroup`] backed
//! by a tokio broadcast channel. A publish encodes the state once and sends
//! the same `Arc<str>` frame to every receiver. Delivery is best-effort: a
//! subscriber that falls more than `capacity` frames behind loses the oldest
//! ones.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::model::ListDocument;
use crate::protocol::{encode_update, ProtocolError};

/// An encoded outbound text frame.
pub type Frame = Arc<str>;

/// Identifies one client connection.
pub type ConnectionId = Uuid;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_subscribers: usize,
}

/// Lock-free counters; read through `stats()`.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Subscribers of a single list.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,
    subscribers: RwLock<HashSet<ConnectionId>>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` is how many frames each receiver may buffer before lagging.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: RwLock::new(HashSet::new()),
            capacity,
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    pub async fn add_subscriber(&self, conn: ConnectionId) -> broadcast::Receiver<Frame> {
        self.subscribers.write().await.insert(conn);
        self.sender.subscribe()
    }

    pub async fn remove_subscriber(&self, conn: &ConnectionId) -> bool {
        self.subscribers.write().await.remove(conn)
    }

    /// Send a pre-encoded frame. Returns how many receivers got it.
    pub fn send(&self, frame: Frame) -> usize {
        let count = self.sender.send(frame).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn has_subscriber(&self, conn: &ConnectionId) -> bool {
        self.subscribers.read().await.contains(conn)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count().await,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps list ids to their broadcast groups. The list id is the topic.
pub struct Broadcaster {
    rooms: Arc<RwLock<HashMap<String, Arc<BroadcastGroup>>>>,
    default_capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Broadcaster {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Join `conn` to `list_id`'s topic.
    pub async fn subscribe(&self, list_id: &str, conn: ConnectionId) -> broadcast::Receiver<Frame> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(list_id.to_string())
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone();
        log::debug!("Connection {conn} subscribed to list {list_id}");
        room.add_subscriber(conn).await
    }

    /// Leave `list_id`'s topic, dropping the room once nobody is left.
    pub async fn unsubscribe(&self, list_id: &str, conn: &ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(list_id) else {
            return false;
        };
        let removed = room.remove_subscriber(conn).await;
        if room.subscriber_count().await == 0 {
            rooms.remove(list_id);
            log::debug!("Room for list {list_id} removed (empty)");
        }
        removed
    }

    /// Send `doc` to everyone subscribed to `list_id`. Returns the number of
    /// receivers reached; zero when nobody listens.
    pub async fn publish(&self, list_id: &str, doc: &ListDocument) -> Result<usize, ProtocolError> {
        let room = self.rooms.read().await.get(list_id).cloned();
        let Some(room) = room else {
            return Ok(0);
        };
        let frame: Frame = encode_update(list_id, doc)?.into();
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(room.send(frame))
    }

    /// Account for frames a lagging receiver skipped.
    pub async fn record_dropped(&self, list_id: &str, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
        if let Some(room) = self.rooms.read().await.get(list_id) {
            room.atomic_stats
                .messages_dropped
                .fetch_add(count, Ordering::Relaxed);
        }
    }

    pub async fn subscriber_count(&self, list_id: &str) -> usize {
        let room = self.rooms.read().await.get(list_id).cloned();
        match room {
            Some(room) => room.subscriber_count().await,
            None => 0,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_lists(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn room(&self, list_id: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(list_id).cloned()
    }

    /// Totals across all rooms, past and present.
    pub async fn stats(&self) -> BroadcastStats {
        let rooms: Vec<Arc<BroadcastGroup>> = self.rooms.read().await.values().cloned().collect();
        let mut active_subscribers = 0;
        for room in &rooms {
            active_subscribers += room.subscriber_count().await;
        }
        BroadcastStats {
            messages_sent: self.published.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            active_subscribers,
        }
    }
}
