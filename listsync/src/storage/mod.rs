//! Persistent storage for list documents.
//!
//! ```text
//! ┌──────────────┐  load / save   ┌──────────────────────────────────┐
//! │ ListCache    │ ─────────────► │ dyn ListStore                    │
//! │ (in-memory)  │                ├──────────────────────────────────┤
//! └──────────────┘                │ RocksListStore                   │
//!                                 │   CF "lists"   : LZ4 documents   │
//!                                 │   CF "metadata": timestamps      │
//!                                 │ MemoryListStore (no data dir)    │
//!                                 └──────────────────────────────────┘
//! ```
//!
//! A missing document is `Ok(None)`, never an error.

pub mod memory;
pub mod rocks;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ListDocument;

pub use memory::MemoryListStore;
pub use rocks::{ListMetadata, RocksListStore, StoreConfig};

/// Durable key-value access to list documents, keyed by list id.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Fetch the document for `id`, or `None` if the store has never seen it.
    async fn load(&self, id: &str) -> Result<Option<ListDocument>, StoreError>;

    /// Replace the document for `id`.
    async fn save(&self, id: &str, doc: &ListDocument) -> Result<(), StoreError>;
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
