//! WebSocket list server.
//!
//! ```text
//! Client A ──┐                 ┌── ListCache ── dyn ListStore (RocksDB / memory)
//!             ├── connection ──┤        │
//! Client B ──┘   (per socket)  └── MutationEngine
//!                                       │
//!                               Broadcaster (topic = list id)
//!                          ┌────────────┼────────────┐
//!                          ▼            ▼            ▼
//!                       Client A     Client B     Client C
//! ```
//!
//! Requests are fire-and-forget: a failing request is logged and counted,
//! but nothing is sent back and the connection stays open. Requests from one
//! connection are handled in arrival order. A connection receives updates for
//! lists it subscribed to and for lists it has edited.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{Broadcaster, ConnectionId, Frame};
use crate::cache::{ListCache, DEFAULT_TTL};
use crate::error::SyncError;
use crate::mutation::MutationEngine;
use crate::protocol::{encode_update, Request};
use crate::storage::{ListStore, MemoryListStore, RocksListStore, StoreConfig, StoreError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
    /// Idle time before a list leaves memory
    pub list_ttl: Duration,
    /// RocksDB directory (None = in-memory store)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            list_ttl: DEFAULT_TTL,
            storage_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub failed_requests: u64,
}

/// State shared by every connection task.
#[derive(Clone)]
struct Shared {
    engine: Arc<MutationEngine>,
    broadcaster: Arc<Broadcaster>,
    stats: Arc<RwLock<ServerStats>>,
    outbox_capacity: usize,
}

/// The list server.
pub struct SyncServer {
    config: ServerConfig,
    cache: Arc<ListCache>,
    broadcaster: Arc<Broadcaster>,
    engine: Arc<MutationEngine>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a server, opening RocksDB when `storage_path` is set.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn ListStore> = match &config.storage_path {
            Some(path) => Arc::new(RocksListStore::open(StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            })?),
            None => {
                log::warn!("No storage path configured, lists will not survive a restart");
                Arc::new(MemoryListStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    /// Create a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn ListStore>) -> Self {
        let cache = Arc::new(ListCache::new(store, config.list_ttl));
        let broadcaster = Arc::new(Broadcaster::new(config.broadcast_capacity));
        let engine = Arc::new(MutationEngine::new(cache.clone(), broadcaster.clone()));
        Self {
            config,
            cache,
            broadcaster,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// In-memory server with default configuration.
    pub fn with_defaults() -> Self {
        Self::with_store(ServerConfig::default(), Arc::new(MemoryListStore::new()))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("List server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        let shared = Shared {
            engine: self.engine.clone(),
            broadcaster: self.broadcaster.clone(),
            stats: self.stats.clone(),
            outbox_capacity: self.config.broadcast_capacity,
        };

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let shared = shared.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, shared).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Drop every cached list and cancel pending evictions.
    pub async fn shutdown(&self) {
        let cleared = self.cache.clear().await;
        log::info!("List server shut down ({cleared} cached lists released)");
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        shared: Shared,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let conn_id: ConnectionId = Uuid::new_v4();

        log::info!("WebSocket connection {conn_id} established from {addr}");
        {
            let mut s = shared.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Subscription forwarders push frames here
        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(shared.outbox_capacity.max(1));
        let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

        let outcome: Result<(), BoxError> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                {
                                    let mut s = shared.stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += text.len() as u64;
                                }

                                let request = match Request::decode(text.as_str()) {
                                    Ok(request) => request,
                                    Err(e) => {
                                        log::warn!("Invalid request from {addr}: {e}");
                                        shared.stats.write().await.failed_requests += 1;
                                        continue;
                                    }
                                };

                                match request {
                                    Request::Subscribe(list_id) => {
                                        Self::join(&shared, conn_id, &list_id, &out_tx, &mut subscriptions).await;
                                        match shared.engine.snapshot(&list_id).await {
                                            Ok(doc) => {
                                                let frame = encode_update(&list_id, &doc)?;
                                                ws_sender.send(Message::text(frame)).await?;
                                            }
                                            Err(e) => {
                                                log::error!("Failed to load list {list_id} for {conn_id}: {e}");
                                                shared.stats.write().await.failed_requests += 1;
                                            }
                                        }
                                    }

                                    Request::Unsubscribe(list_id) => {
                                        if let Some(forwarder) = subscriptions.remove(&list_id) {
                                            forwarder.abort();
                                            shared.broadcaster.unsubscribe(&list_id, &conn_id).await;
                                        }
                                    }

                                    mutation => {
                                        // Writers hear the outcome of their own edits
                                        Self::join(&shared, conn_id, mutation.list_id(), &out_tx, &mut subscriptions).await;
                                        if let Err(e) = Self::apply(&shared.engine, &mutation).await {
                                            log::error!("Request from {addr} failed: {e}; request {mutation:?}");
                                            shared.stats.write().await.failed_requests += 1;
                                        }
                                    }
                                }
                            }

                            Some(Ok(Message::Binary(_))) => {
                                log::warn!("Ignoring binary frame from {addr}");
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection {conn_id} closed from {addr}");
                                break;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    Some(frame) = out_rx.recv() => {
                        ws_sender.send(Message::text(frame.to_string())).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        for (list_id, forwarder) in subscriptions.drain() {
            forwarder.abort();
            shared.broadcaster.unsubscribe(&list_id, &conn_id).await;
        }
        shared.stats.write().await.active_connections -= 1;

        outcome
    }

    /// Subscribe the connection to `list_id` unless it already is.
    /// Returns whether a new subscription was made.
    async fn join(
        shared: &Shared,
        conn_id: ConnectionId,
        list_id: &str,
        out_tx: &mpsc::Sender<Frame>,
        subscriptions: &mut HashMap<String, JoinHandle<()>>,
    ) -> bool {
        if subscriptions.contains_key(list_id) {
            return false;
        }
        let rx = shared.broadcaster.subscribe(list_id, conn_id).await;
        let forwarder = Self::spawn_forwarder(
            list_id.to_string(),
            rx,
            out_tx.clone(),
            shared.broadcaster.clone(),
        );
        subscriptions.insert(list_id.to_string(), forwarder);
        true
    }

    async fn apply(engine: &MutationEngine, request: &Request) -> Result<(), SyncError> {
        match request {
            Request::Add(req) => engine.add_item(req).await.map(|_| ()),
            Request::Remove(req) => engine.remove_item(req).await.map(|_| ()),
            Request::Subscribe(_) | Request::Unsubscribe(_) => Ok(()),
        }
    }

    /// Move frames from a list topic into one connection's outbox.
    fn spawn_forwarder(
        list_id: String,
        mut rx: broadcast::Receiver<Frame>,
        out_tx: mpsc::Sender<Frame>,
        broadcaster: Arc<Broadcaster>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        if out_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Subscriber of list {list_id} lagged by {n} updates");
                        broadcaster.record_dropped(&list_id, n).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ListCache> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<MutationEngine> {
        &self.engine
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListDocument;
    use crate::protocol::AddItem;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.list_ttl, Duration::from_millis(3_600_000));
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_server_creation() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert_eq!(server.cache().ttl(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn test_server_with_rocks_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            storage_path: Some(dir.path().join("db")),
            ..ServerConfig::default()
        };
        let server = SyncServer::new(config).unwrap();

        server
            .engine()
            .add_item(&AddItem::new("L1", "milk"))
            .await
            .unwrap();
        let stored = server.cache().store().load("L1").await.unwrap();
        assert_eq!(stored.map(|d| d.items.len()), Some(1));
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.failed_requests, 0);
    }

    #[tokio::test]
    async fn test_shutdown_clears_cache() {
        let store = MemoryListStore::new();
        store.insert("L1", ListDocument::named("Groceries")).await;
        let server = SyncServer::with_store(ServerConfig::default(), Arc::new(store));

        server.engine().snapshot("L1").await.unwrap();
        assert_eq!(server.cache().len().await, 1);
        server.shutdown().await;
        assert!(server.cache().is_empty().await);
    }
}
