//! Two-tier parse cache: bounded in-memory LRU+TTL in front of a persistent
//! disk cache. Reads check memory, then disk (warming memory on a disk hit),
//! then report a miss. Writes go through both tiers. Cache failures are
//! logged and degrade to misses; they never fail the orchestrator.

pub mod disk;
pub mod memory;

pub use disk::{CACHE_FORMAT_VERSION, DiskCache};
pub use memory::{MemoryCache, MemoryCacheConfig, MemoryCacheStats};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ParseResult;

/// Memory-tier envelope: the hash rides along so a stale entry for a changed
/// file is never served.
#[derive(Serialize, Deserialize)]
struct MemoryEnvelope {
    content_hash: String,
    result: ParseResult,
}

pub struct CacheLayer {
    memory: MemoryCache,
    disk: Option<DiskCache>,
}

impl CacheLayer {
    /// Full two-tier cache backed by a disk database at `disk_path`.
    /// A disk-open failure degrades to memory-only operation.
    pub fn open(disk_path: &Path, config: MemoryCacheConfig) -> Self {
        let disk = match DiskCache::open(disk_path) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "disk cache unavailable, running memory-only");
                None
            }
        };
        CacheLayer { memory: MemoryCache::new(config), disk }
    }

    /// Memory-only cache (used by `--no-cache` runs and tests).
    pub fn memory_only(config: MemoryCacheConfig) -> Self {
        CacheLayer { memory: MemoryCache::new(config), disk: None }
    }

    fn memory_key(path: &str) -> String {
        format!("parse:{}", path)
    }

    /// Look up a parse result for (path, current hash).
    pub fn get_parse(&self, path: &str, current_hash: &str) -> Option<ParseResult> {
        let key = Self::memory_key(path);

        if let Some(raw) = self.memory.get(&key) {
            match serde_json::from_str::<MemoryEnvelope>(&raw) {
                Ok(env) if env.content_hash == current_hash => return Some(env.result),
                Ok(_) => self.memory.remove(&key),
                Err(e) => {
                    warn!(path, error = %e, "corrupt memory cache entry, dropping");
                    self.memory.remove(&key);
                }
            }
        }

        let disk = self.disk.as_ref()?;
        match disk.get(path, current_hash) {
            Ok(Some(result)) => {
                // Warm the memory tier for future lookups.
                self.store_memory(path, current_hash, &result);
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path, error = %e, "disk cache read failed, treating as miss");
                None
            }
        }
    }

    /// Write-through to both tiers after a successful parse.
    pub fn put_parse(&self, path: &str, hash: &str, mtime: i64, result: &ParseResult) {
        self.store_memory(path, hash, result);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(path, hash, mtime, result) {
                warn!(path, error = %e, "disk cache write failed");
            }
        }
    }

    fn store_memory(&self, path: &str, hash: &str, result: &ParseResult) {
        let env = MemoryEnvelope { content_hash: hash.to_string(), result: result.clone() };
        match serde_json::to_string(&env) {
            Ok(raw) => {
                self.memory.put(&Self::memory_key(path), raw, None, Some("parse_result"));
            }
            Err(e) => warn!(path, error = %e, "failed to serialize parse result for memory cache"),
        }
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
