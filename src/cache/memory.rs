use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::Storage;
use super::entry::CacheEntry;

type Shard = RwLock<HashMap<String, CacheEntry>>;

/// Unbounded in-memory store, split into independently locked shards.
///
/// Keys are spread across shards by hash, so writers on different keys
/// usually take different locks. Within a shard, lookups share a read lock.
/// A lookup that finds an expired entry re-takes the shard's write lock and
/// removes the entry only if it is still expired at that point, so a `set`
/// racing with the lookup is never thrown away.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use pagecache::cache::{MemoryStorage, Storage};
///
/// let store = MemoryStorage::new();
/// assert!(store.get("/a?x=1").is_none());
///
/// store.set("/a?x=1", Bytes::from_static(b"hi"), Duration::from_secs(10));
/// assert_eq!(store.get("/a?x=1").as_deref(), Some(&b"hi"[..]));
/// ```
#[derive(Debug)]
pub struct MemoryStorage {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl MemoryStorage {
    pub const DEFAULT_SHARDS: usize = 16;

    pub fn new() -> Self {
        Self::with_shards(Self::DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` independently locked partitions.
    /// A count of zero is treated as one.
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &str) -> &Shard {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while holding a shard lock cannot leave a map half-updated: every
// mutation is a single insert or remove.
fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
    shard.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
    shard.write().unwrap_or_else(PoisonError::into_inner)
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Bytes> {
        let shard = self.shard(key);
        let now = Instant::now();

        match read(shard).get(key) {
            None => return None,
            Some(entry) if entry.is_fresh(now) => return Some(entry.payload().clone()),
            Some(_) => {}
        }

        let mut map = write(shard);
        if map.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            map.remove(key);
        }
        None
    }

    fn set(&self, key: &str, payload: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(payload, ttl, Instant::now());
        write(self.shard(key)).insert(key.to_owned(), entry);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                let mut map = write(shard);
                let before = map.len();
                map.retain(|_, entry| entry.is_fresh(now));
                before - map.len()
            })
            .sum()
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| read(shard).len()).sum()
    }
}
