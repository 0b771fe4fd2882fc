//! In-memory LRU + TTL cache.
//!
//! String-keyed, size-accounted, guarded by a single mutex. Entries expire by
//! TTL (lazily on access, eagerly via `cleanup_expired`) and are evicted in
//! strict LRU order when the byte cap is reached. A single entry larger than
//! cap/10 is rejected outright so one oversized value cannot flush the cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default cap: ~100 MiB.
pub const DEFAULT_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Default TTL: 3 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 24 * 3600);

/// Fixed per-entry bookkeeping overhead added to the size estimate.
const ENTRY_OVERHEAD: usize = 64;

#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    pub max_bytes: usize,
    pub default_ttl: Duration,
    /// TTL overrides by entity type tag (e.g. "parse_result", "query").
    pub ttl_by_type: HashMap<String, Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        MemoryCacheConfig {
            max_bytes: DEFAULT_MAX_BYTES,
            default_ttl: DEFAULT_TTL,
            ttl_by_type: HashMap::new(),
        }
    }
}

struct Entry {
    value: String,
    size: usize,
    ttl: Duration,
    expires_at: Instant,
    /// Recency tick; key into `lru`.
    tick: u64,
    access_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entry_count: usize,
    pub size_bytes: usize,
}

impl MemoryCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

struct Inner {
    map: HashMap<String, Entry>,
    /// recency tick -> key; lowest tick is least recently used.
    lru: BTreeMap<u64, String>,
    next_tick: u64,
    size_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

pub struct MemoryCache {
    config: MemoryCacheConfig,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        MemoryCache {
            config,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                lru: BTreeMap::new(),
                next_tick: 0,
                size_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MemoryCacheConfig::default())
    }

    /// Largest admissible single entry.
    pub fn entry_cap(&self) -> usize {
        self.config.max_bytes / 10
    }

    /// Get a value, refreshing TTL expiry and LRU recency on hit.
    /// An expired entry is removed and counts as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let now = Instant::now();

        let expired = match inner.map.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            Self::remove_entry(&mut inner, key);
            inner.expirations += 1;
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        let tick = inner.next_tick;
        inner.next_tick += 1;
        let (old_tick, value) = match inner.map.get_mut(key) {
            Some(entry) => {
                let old = entry.tick;
                entry.tick = tick;
                entry.expires_at = now + entry.ttl;
                entry.access_count += 1;
                (old, entry.value.clone())
            }
            None => return None,
        };
        inner.lru.remove(&old_tick);
        inner.lru.insert(tick, key.to_string());
        Some(value)
    }

    /// Insert a value. Returns false (without altering totals) when the
    /// estimated size exceeds the single-entry cap. Otherwise evicts LRU
    /// entries until the new total fits.
    pub fn put(&self, key: &str, value: String, ttl: Option<Duration>, entity_type: Option<&str>) -> bool {
        let size = key.len() + value.len() + ENTRY_OVERHEAD;
        if size > self.entry_cap() {
            return false;
        }

        let ttl = ttl
            .or_else(|| entity_type.and_then(|t| self.config.ttl_by_type.get(t).copied()))
            .unwrap_or(self.config.default_ttl);

        let mut inner = self.lock();
        let now = Instant::now();

        // Replacing an existing key frees its size first.
        if inner.map.contains_key(key) {
            Self::remove_entry(&mut inner, key);
        }

        // Under pressure, expired entries go first, then strict LRU.
        if inner.size_bytes + size > self.config.max_bytes {
            let expired_keys: Vec<String> = inner
                .map
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for k in expired_keys {
                Self::remove_entry(&mut inner, &k);
                inner.expirations += 1;
            }
        }

        while inner.size_bytes + size > self.config.max_bytes {
            let Some((&tick, _)) = inner.lru.iter().next() else { break };
            let victim = inner.lru[&tick].clone();
            Self::remove_entry(&mut inner, &victim);
            inner.evictions += 1;
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.size_bytes += size;
        inner.lru.insert(tick, key.to_string());
        inner.map.insert(
            key.to_string(),
            Entry { value, size, ttl, expires_at: now + ttl, tick, access_count: 0 },
        );
        true
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.lock();
        Self::remove_entry(&mut inner, key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.lru.clear();
        inner.size_bytes = 0;
    }

    /// Eagerly drop all TTL-expired entries; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for k in expired {
            Self::remove_entry(&mut inner, &k);
            inner.expirations += 1;
        }
        count
    }

    pub fn stats(&self) -> MemoryCacheStats {
        let inner = self.lock();
        MemoryCacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            entry_count: inner.map.len(),
            size_bytes: inner.size_bytes,
        }
    }

    fn remove_entry(inner: &mut Inner, key: &str) {
        if let Some(entry) = inner.map.remove(key) {
            inner.lru.remove(&entry.tick);
            inner.size_bytes -= entry.size;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
