//! List mutations and the write-through pipeline.
//!
//! [`apply_add`] and [`apply_remove`] are pure edits on a [`ListRecord`].
//! [`MutationEngine`] wraps them in the full pipeline:
//!
//! ```text
//! ensure(id) ──► lock record ──► apply ──► touch(id) ──► store.save ──► publish
//!                     └───────────── held until publish ─────────────────┘
//! ```
//!
//! Holding the record lock through persist and publish keeps store writes and
//! broadcasts for one list in mutation order. A failed save does not stop the
//! broadcast: the in-memory record stays authoritative.

use std::sync::Arc;
use std::time::SystemTime;

use crate::broadcast::Broadcaster;
use crate::cache::ListCache;
use crate::error::SyncError;
use crate::model::{Item, ListDocument, ListRecord};
use crate::protocol::{AddItem, RemoveItem};

/// Source of item timestamps (epoch milliseconds).
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Put `req.item` at the front of the list, stamped `now`.
///
/// Any existing item with the same text is dropped first, so re-adding moves
/// it to the front with a fresh timestamp instead of duplicating it.
pub fn apply_add(record: &mut ListRecord, req: &AddItem, now: i64) {
    record.items.retain(|i| i.item != req.item);
    record.items.insert(
        0,
        Item::new(req.item.clone(), req.color.clone(), req.text_color.clone(), now),
    );
}

/// Drop every item whose text equals `req.item`. Returns how many went.
pub fn apply_remove(record: &mut ListRecord, req: &RemoveItem) -> usize {
    let before = record.items.len();
    record.items.retain(|i| i.item != req.item);
    before - record.items.len()
}

/// Runs add/remove requests against the cache, store and broadcaster.
pub struct MutationEngine {
    cache: Arc<ListCache>,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
}

impl MutationEngine {
    pub fn new(cache: Arc<ListCache>, broadcaster: Arc<Broadcaster>) -> Self {
        Self::with_clock(cache, broadcaster, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cache: Arc<ListCache>,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            broadcaster,
            clock,
        }
    }

    /// Add (or move to front) an item and return the list's new state.
    pub async fn add_item(&self, req: &AddItem) -> Result<ListDocument, SyncError> {
        req.validate()?;
        let record = self.cache.ensure(&req.id).await?;
        let mut record = record.lock().await;

        apply_add(&mut record, req, self.clock.now_millis());
        log::debug!("Added {:?} to list {} ({} items)", req.item, req.id, record.len());

        self.commit(&record).await
    }

    /// Remove an item by text and return the list's new state.
    pub async fn remove_item(&self, req: &RemoveItem) -> Result<ListDocument, SyncError> {
        req.validate()?;
        let record = self.cache.ensure(&req.id).await?;
        let mut record = record.lock().await;

        let removed = apply_remove(&mut record, req);
        if removed == 0 {
            log::debug!("Remove of {:?} from list {}: no match", req.item, req.id);
        }

        self.commit(&record).await
    }

    /// Current state of a list, hydrating it if needed.
    pub async fn snapshot(&self, id: &str) -> Result<ListDocument, SyncError> {
        let record = self.cache.ensure(id).await?;
        let record = record.lock().await;
        Ok(record.document())
    }

    pub fn cache(&self) -> &Arc<ListCache> {
        &self.cache
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Touch, persist and publish. Caller holds the record lock.
    async fn commit(&self, record: &ListRecord) -> Result<ListDocument, SyncError> {
        let id = record.id.clone();
        self.cache.touch(&id).await;

        let doc = record.document();
        let persisted = self.cache.store().save(&id, &doc).await;
        if let Err(e) = &persisted {
            log::error!("Failed to persist list {id}: {e}");
        }

        match self.broadcaster.publish(&id, &doc).await {
            Ok(n) => log::trace!("Published list {id} to {n} subscribers"),
            Err(e) => log::error!("Failed to publish list {id}: {e}"),
        }

        persisted.map_err(|e| SyncError::store(&id, e))?;
        Ok(doc)
    }
}
