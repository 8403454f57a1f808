//! Bounded, non-evicting memoization of bound records.
//!
//! Keys are `(offset, size, target type)`: the same encoded value bound into two
//! different record types gets two entries. Once `capacity` entries have been
//! accepted, further inserts are rejected; nothing is ever evicted.
//!
//! # Thread Safety
//!
//! Inserts are gated by an atomic counter: a relaxed capacity check, then an
//! increment whose result is checked again before the entry is stored. Racing
//! inserts can push the counter past `capacity`, which only means a few values
//! that would have fit are not cached. `try_insert` returning `false` means
//! "not cached", never an error. Entries live in hash shards behind their own
//! `RwLock`s so lookups from many threads rarely contend.

use rustc_hash::{FxHashMap, FxHasher};
use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

const SHARD_COUNT: usize = 16;

/// Identity of one cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Absolute offset of the encoded value
    pub offset: u64,
    /// Size field of the value's control header
    pub size: u64,
    /// Record type the value was bound to
    pub type_id: TypeId,
}

impl CacheKey {
    /// Key for a value bound to `T`
    pub fn of<T: Any>(offset: u64, size: u64) -> Self {
        Self {
            offset,
            size,
            type_id: TypeId::of::<T>(),
        }
    }
}

type Entry = Arc<dyn Any + Send + Sync>;
type Shard = RwLock<FxHashMap<CacheKey, Entry>>;

/// Concurrent non-evicting cache
pub struct DecodeCache {
    capacity: usize,
    count: AtomicUsize,
    shards: Box<[Shard]>,
}

impl DecodeCache {
    /// Create a cache that accepts up to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Self {
            capacity,
            count: AtomicUsize::new(0),
            shards,
        }
    }

    fn shard(&self, key: &CacheKey) -> &Shard {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Look up a value previously stored for `key`
    pub fn get<T: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<T>> {
        let shard = self.shard(key).read().unwrap_or_else(PoisonError::into_inner);
        let entry = shard.get(key)?.clone();
        drop(shard);
        entry.downcast::<T>().ok()
    }

    /// Store `value` unless the cache is full or the key is already present.
    ///
    /// Returns `true` if the value was stored.
    pub fn try_insert<T: Any + Send + Sync>(&self, key: CacheKey, value: Arc<T>) -> bool {
        if self.count.load(Ordering::Relaxed) >= self.capacity {
            return false;
        }
        if self.count.fetch_add(1, Ordering::AcqRel) >= self.capacity {
            tracing::trace!(offset = key.offset, "cache full, rejecting insert");
            return false;
        }

        let mut shard = self.shard(&key).write().unwrap_or_else(PoisonError::into_inner);
        if shard.contains_key(&key) {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        shard.insert(key, value);
        true
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// True when nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of accepted inserts
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for DecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
