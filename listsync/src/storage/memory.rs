//! In-process list store.
//!
//! Used when the server runs without a data directory, and by tests, which
//! rely on its read/write counters, optional latency and failure switches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{ListStore, StoreError};
use crate::model::ListDocument;

/// Map-backed [`ListStore`]. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryListStore {
    docs: Arc<RwLock<HashMap<String, ListDocument>>>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load and save sleeps for `latency` first.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seed a document without counting it as a write.
    pub async fn insert(&self, id: impl Into<String>, doc: ListDocument) {
        self.docs.write().await.insert(id.into(), doc);
    }

    /// Read a document without counting it as a load.
    pub async fn get(&self, id: &str) -> Option<ListDocument> {
        self.docs.read().await.get(id).cloned()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn load(&self, id: &str) -> Result<Option<ListDocument>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("read of '{id}' refused")));
        }
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn save(&self, id: &str, doc: &ListDocument) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write of '{id}' refused")));
        }
        self.docs.write().await.insert(id.to_string(), doc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_counts_read() {
        let store = MemoryListStore::new();
        assert_eq!(store.load("L1").await.unwrap(), None);
        assert_eq!(store.reads(), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryListStore::new();
        store.save("L1", &ListDocument::named("Todo")).await.unwrap();
        assert_eq!(store.load("L1").await.unwrap(), Some(ListDocument::named("Todo")));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryListStore::new();
        let other = store.clone();
        store.insert("L1", ListDocument::named("Shared")).await;
        assert_eq!(other.get("L1").await, Some(ListDocument::named("Shared")));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryListStore::new();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        assert!(matches!(store.load("L1").await, Err(StoreError::Unavailable(_))));
        assert!(store.save("L1", &ListDocument::default()).await.is_err());
        assert_eq!(store.get("L1").await, None);
    }
}
