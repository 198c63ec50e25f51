use std::collections::HashMap;
use std::hash::Hash;

use crate::models::CacheStats;

/// Default number of decoded tiles kept in memory.
pub const CACHE_SIZE_LIMIT: usize = 100;

// Simple LRU cache implementation.
//
// Each entry carries the tick of its last access; the entry with the smallest
// tick is the least recently used. Ticks come from a counter rather than the
// wall clock so two accesses in the same instant still have an order.
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    data: HashMap<K, (V, u64)>,
    hits: usize,
    misses: usize,
    evictions: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            data: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a key and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        match self.data.get_mut(key) {
            Some((value, last_access)) => {
                *last_access = tick;
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        self.data.insert(key, (value, tick));
        self.evict_to(self.capacity);
    }

    /// Change the capacity, evicting immediately if the cache is now too big.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_to(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Evict oldest entries until at most `limit` remain
    fn evict_to(&mut self, limit: usize) {
        while self.data.len() > limit {
            let Some(oldest_key) = self
                .data
                .iter()
                .min_by_key(|(_, (_, last_access))| *last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            self.data.remove(&oldest_key);
            self.evictions += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let total_requests = self.hits + self.misses;
        CacheStats {
            entries: self.data.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            total_requests,
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                self.hits as f64 / total_requests as f64
            },
        }
    }
}
