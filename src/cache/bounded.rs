use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

use super::Storage;
use super::entry::CacheEntry;

/// In-memory store holding at most `capacity` entries.
///
/// Inserting into a full store evicts the least-recently-used entry. A hit
/// counts as a use. Expiration works exactly as in
/// [`MemoryStorage`](super::MemoryStorage): eviction only ever removes
/// entries earlier, it never keeps one alive past its TTL.
///
/// Lookups reorder the recency list, so every operation takes one mutex.
pub struct LruStorage {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl fmt::Debug for LruStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        f.debug_struct("LruStorage")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl LruStorage {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.lock().cap()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for LruStorage {
    fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.peek(key).map(|entry| entry.is_fresh(now)) {
            None => None,
            Some(false) => {
                entries.pop(key);
                None
            }
            Some(true) => entries.get(key).map(|entry| entry.payload().clone()),
        }
    }

    fn set(&self, key: &str, payload: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(payload, ttl, Instant::now());
        let evicted = self.lock().push(key.to_owned(), entry);
        if let Some((evicted_key, _)) = evicted.filter(|(k, _)| k != key) {
            trace!(key = %evicted_key, "evicted least-recently-used entry");
        }
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
