//! In-memory TTL cache with a bounded capacity.
//!
//! `ExpiringCache` backs the weather fact provider: formatted reports are
//! kept for a fixed TTL so repeated requests for the same location within
//! the window cost nothing. Expired entries are evicted lazily on access —
//! there is no background sweep. When the cache is full the oldest-inserted
//! entry is dropped first (the key space is small and the TTL already bounds
//! staleness, so plain insertion order is enough; LRU would be overkill).
//!
//! The cache itself is not `Sync` — callers wrap it in `Arc<Mutex<..>>` so
//! it can be shared between the inbound event path and the scheduler tasks.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Capacity-bounded key→value store with per-entry expiry.
pub struct ExpiringCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    insertion_order: VecDeque<K>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> ExpiringCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            entries: HashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
        }
    }

    /// Returns a clone of the cached value iff the entry is still fresh.
    /// An expired entry is removed on the way out and reported as a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                self.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key` until `now + ttl`. Overwriting an existing
    /// key refreshes both the value and its position in the eviction order.
    pub fn put(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.insertion_order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.insertion_order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
        self.insertion_order.retain(|k| k != key);
    }
}
