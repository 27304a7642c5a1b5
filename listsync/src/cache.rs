//! In-memory list cache with lazy hydration and idle eviction.
//!
//! ```text
//!  ensure(id) ──► slot(id) ──► OnceCell<record> ──(first caller)──► store.load(id)
//!                   │               ▲
//!                   │               └── concurrent callers await the same load
//!                   ▼
//!            eviction timer (generation N) ── sleep(ttl) ──► evict if still N
//! ```
//!
//! Every cached list lives in a [`CacheSlot`]. The slot's `OnceCell` holds the
//! outcome of the single hydration attempt shared by all waiters, so a cold
//! list is read from the store exactly once no matter how many requests race
//! for it. A failed attempt is handed to every waiter and the slot is then
//! dropped; only a caller arriving afterwards starts a new load.
//!
//! Each `ensure`/`touch` aborts the slot's timer task and spawns a new one
//! with a bumped generation. A timer only evicts when its generation is still
//! current and nobody holds the record lock. Eviction drops the in-memory
//! entry only; the stored document is untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::model::ListRecord;
use crate::storage::{ListStore, StoreError};

/// Idle time after which a list leaves the cache (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_millis(3_600_000);

/// A cached list. Lock it to read or mutate.
pub type SharedRecord = Arc<Mutex<ListRecord>>;

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `ensure` calls served from memory
    pub hits: u64,
    /// `ensure` calls that had to wait for a hydration
    pub misses: u64,
    /// Store reads issued for hydration
    pub hydrations: u64,
    /// Entries dropped, by timer or explicitly
    pub evictions: u64,
    /// Entries currently cached
    pub cached: usize,
}

#[derive(Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    hydrations: AtomicU64,
    evictions: AtomicU64,
}

/// Outcome of one hydration attempt.
type Hydration = Result<SharedRecord, StoreError>;

/// One list id's cache entry.
struct CacheSlot {
    record: OnceCell<Hydration>,
    eviction: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            record: OnceCell::new(),
            eviction: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// The record, once hydration has succeeded.
    fn hydrated(&self) -> Option<&SharedRecord> {
        match self.record.get() {
            Some(Ok(record)) => Some(record),
            _ => None,
        }
    }
}

type SlotMap = Arc<RwLock<HashMap<String, Arc<CacheSlot>>>>;

enum Expiry {
    Evicted,
    /// Touched, replaced or already gone
    Stale,
    /// A mutation holds the record
    Busy,
}

/// Process-wide list cache.
///
/// Constructed once at startup and shared by reference (`Arc`) with every
/// connection handler.
pub struct ListCache {
    store: Arc<dyn ListStore>,
    slots: SlotMap,
    ttl: Duration,
    stats: Arc<AtomicCacheStats>,
}

impl ListCache {
    pub fn new(store: Arc<dyn ListStore>, ttl: Duration) -> Self {
        Self {
            store,
            slots: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            stats: Arc::new(AtomicCacheStats::default()),
        }
    }

    pub fn with_default_ttl(store: Arc<dyn ListStore>) -> Self {
        Self::new(store, DEFAULT_TTL)
    }

    /// Return the cached record for `id`, hydrating it from the store on a
    /// miss. Either way the eviction timer is restarted.
    ///
    /// A list the store does not know comes back empty. A store failure
    /// yields [`SyncError::StoreUnavailable`] and leaves nothing cached.
    pub async fn ensure(&self, id: &str) -> Result<SharedRecord, SyncError> {
        loop {
            let slot = self.slot(id).await;

            let record = match slot.hydrated() {
                Some(record) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    record.clone()
                }
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    match slot.record.get_or_init(|| self.hydrate(id)).await {
                        Ok(record) => record.clone(),
                        Err(e) => {
                            self.discard_unhydrated(id, &slot).await;
                            return Err(SyncError::store(id, e.clone()));
                        }
                    }
                }
            };

            self.schedule_eviction(id, &slot).await;

            if self.is_current(id, &slot).await {
                return Ok(record);
            }

            // Evicted between lookup and scheduling; the orphan's timer must not outlive it
            if let Some(timer) = slot.eviction.lock().await.take() {
                timer.abort();
            }
            log::debug!("List {id} was evicted during ensure, retrying");
        }
    }

    /// Restart the eviction timer of a cached list. Returns `false` when the
    /// list is not cached.
    pub async fn touch(&self, id: &str) -> bool {
        let slot = self.slots.read().await.get(id).cloned();
        match slot {
            Some(slot) if slot.hydrated().is_some() => {
                self.schedule_eviction(id, &slot).await;
                log::trace!("Touched list {id}");
                true
            }
            _ => false,
        }
    }

    /// Drop `id` from memory now. The stored document is not affected.
    ///
    /// Returns `false` when the list is not cached or a mutation currently
    /// holds its record; the running mutation keeps the entry alive.
    pub async fn evict(&self, id: &str) -> bool {
        let slot = {
            let mut slots = self.slots.write().await;
            let Some(slot) = slots.get(id) else {
                return false;
            };
            if let Some(record) = slot.hydrated() {
                if record.try_lock().is_err() {
                    log::debug!("List {id} busy, not evicting");
                    return false;
                }
            }
            match slots.remove(id) {
                Some(slot) => slot,
                None => return false,
            }
        };
        if let Some(timer) = slot.eviction.lock().await.take() {
            timer.abort();
        }
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        log::info!("Evicted list {id}");
        true
    }

    /// Evict everything, cancelling all timers.
    pub async fn clear(&self) -> usize {
        let drained: Vec<(String, Arc<CacheSlot>)> = self.slots.write().await.drain().collect();
        for (_, slot) in &drained {
            if let Some(timer) = slot.eviction.lock().await.take() {
                timer.abort();
            }
        }
        self.stats
            .evictions
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        if !drained.is_empty() {
            log::info!("Cleared {} cached lists", drained.len());
        }
        drained.len()
    }

    /// Whether a hydrated record for `id` is cached.
    pub async fn contains(&self, id: &str) -> bool {
        self.slots
            .read()
            .await
            .get(id)
            .is_some_and(|slot| slot.hydrated().is_some())
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    pub async fn cached_ids(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn ListStore> {
        &self.store
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            hydrations: self.stats.hydrations.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            cached: self.slots.read().await.len(),
        }
    }

    /// Get or create the slot for `id`.
    async fn slot(&self, id: &str) -> Arc<CacheSlot> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(id) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(CacheSlot::new()))
            .clone()
    }

    async fn hydrate(&self, id: &str) -> Hydration {
        self.stats.hydrations.fetch_add(1, Ordering::Relaxed);
        let record = match self.store.load(id).await {
            Ok(Some(doc)) => {
                log::info!("Hydrated list {id} ({} items)", doc.items.len());
                ListRecord::from_document(id, doc)
            }
            Ok(None) => {
                log::info!("List {id} not in store, starting empty");
                ListRecord::empty(id)
            }
            Err(e) => {
                log::error!("Failed to hydrate list {id}: {e}");
                return Err(e);
            }
        };
        Ok(Arc::new(Mutex::new(record)))
    }

    async fn is_current(&self, id: &str, slot: &Arc<CacheSlot>) -> bool {
        self.slots
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Remove a slot whose hydration failed so the next call starts fresh.
    async fn discard_unhydrated(&self, id: &str, slot: &Arc<CacheSlot>) {
        let mut slots = self.slots.write().await;
        let failed = slots
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.hydrated().is_none());
        if failed {
            slots.remove(id);
        }
    }

    /// Cancel the slot's timer and start a new one with a fresh generation.
    async fn schedule_eviction(&self, id: &str, slot: &Arc<CacheSlot>) {
        let mut timer = slot.eviction.lock().await;
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let generation = slot.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let slots = self.slots.clone();
        let stats = self.stats.clone();
        let owner = Arc::downgrade(slot);
        let id = id.to_string();
        let ttl = self.ttl;

        *timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(ttl).await;
                match expire(&slots, &id, &owner, generation).await {
                    Expiry::Busy => {
                        log::debug!("List {id} busy at expiry, deferring eviction");
                    }
                    Expiry::Evicted => {
                        stats.evictions.fetch_add(1, Ordering::Relaxed);
                        log::info!("Evicted list {id} after {}s idle", ttl.as_secs());
                        break;
                    }
                    Expiry::Stale => break,
                }
            }
        }));
    }
}

/// Timer-side eviction: remove `id` only if `owner` is still its slot and
/// `generation` is still current.
async fn expire(slots: &SlotMap, id: &str, owner: &Weak<CacheSlot>, generation: u64) -> Expiry {
    let Some(owner) = owner.upgrade() else {
        return Expiry::Stale;
    };

    let mut map = slots.write().await;
    let Some(slot) = map.get(id) else {
        return Expiry::Stale;
    };
    if !Arc::ptr_eq(slot, &owner) || slot.generation.load(Ordering::SeqCst) != generation {
        return Expiry::Stale;
    }
    if let Some(record) = slot.hydrated() {
        if record.try_lock().is_err() {
            return Expiry::Busy;
        }
    }

    map.remove(id);
    Expiry::Evicted
}
