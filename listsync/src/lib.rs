//! # listsync - Real-time shared lists over WebSocket
//!
//! Clients add and remove items on named lists; every connection subscribed
//! to a list receives its full new state after each change.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ ListClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │   JSON envelopes    │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴────────┐
//!                                    │ MutationEngine │
//!                                    └───┬────────┬───┘
//!                                        │        │
//!                              ┌─────────┴──┐  ┌──┴──────────┐
//!                              │ ListCache  │  │ Broadcaster │
//!                              │ (TTL)      │  │ (fan-out)   │
//!                              └─────┬──────┘  └─────────────┘
//!                                    │
//!                              ┌─────┴──────┐
//!                              │ ListStore  │
//!                              │ (RocksDB)  │
//!                              └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Text wire protocol (JSON envelopes)
//! - [`model`]: Items, stored documents and in-memory records
//! - [`cache`]: Lazy hydration with per-list eviction timers
//! - [`mutation`]: Add/remove semantics, write-through and publish
//! - [`broadcast`]: Per-list fan-out with backpressure
//! - [`server`]: WebSocket list server
//! - [`client`]: WebSocket list client
//! - [`storage`]: Persistent store seam and its backends

pub mod broadcast;
pub mod cache;
pub mod client;
pub mod error;
pub mod model;
pub mod mutation;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, Broadcaster, ConnectionId, Frame};
pub use cache::{CacheStats, ListCache, SharedRecord, DEFAULT_TTL};
pub use client::{ClientEvent, ConnectionState, ListClient};
pub use error::SyncError;
pub use model::{Item, ListDocument, ListRecord};
pub use mutation::{Clock, MutationEngine, SystemClock};
pub use protocol::{AddItem, Envelope, ProtocolError, RemoveItem, Request};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use storage::{
    ListMetadata, ListStore, MemoryListStore, RocksListStore, StoreConfig, StoreError,
};
