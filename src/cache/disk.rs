//! Persistent parse cache: one SQLite database in the cache directory.
//!
//! Keyed by absolute file path; a hit requires the stored content hash to
//! equal the file's current hash (mtime is advisory only). Payloads are
//! schema-versioned JSON (never a language-native object format), and the
//! deserializer rejects newer versions and hash mismatches.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::{ParseResult, now_secs};

/// Cache payload format version. Bump when `ParseResult` changes incompatibly.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Versioned envelope around a serialized parse result.
#[derive(Serialize, Deserialize, Debug)]
struct CachedParse {
    version: u32,
    content_hash: String,
    result: ParseResult,
}

pub struct DiskCache {
    conn: Mutex<Connection>,
}

impl DiskCache {
    /// Open (or create) the disk cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| IndexError::Cache(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| IndexError::Cache(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_cache (
                 file_path     TEXT PRIMARY KEY,
                 content_hash  TEXT NOT NULL,
                 last_modified INTEGER NOT NULL,
                 payload       TEXT NOT NULL,
                 created_at    INTEGER NOT NULL,
                 access_count  INTEGER NOT NULL DEFAULT 0,
                 last_accessed INTEGER NOT NULL
             )",
        )
        .map_err(|e| IndexError::Cache(e.to_string()))?;
        Ok(DiskCache { conn: Mutex::new(conn) })
    }

    /// Fetch a cached parse for `path`, returning a hit only when the stored
    /// hash equals `current_hash`. Refreshes the advisory access counter.
    pub fn get(&self, path: &str, current_hash: &str) -> Result<Option<ParseResult>, IndexError> {
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT content_hash, payload FROM file_cache WHERE file_path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| IndexError::Cache(e.to_string()))?;

        let Some((stored_hash, payload)) = row else { return Ok(None) };
        if stored_hash != current_hash {
            return Ok(None);
        }

        let cached: CachedParse = serde_json::from_str(&payload)
            .map_err(|e| IndexError::Cache(format!("corrupt cache payload for {}: {}", path, e)))?;
        if cached.version > CACHE_FORMAT_VERSION {
            return Err(IndexError::Cache(format!(
                "cache payload version {} is newer than supported {}",
                cached.version, CACHE_FORMAT_VERSION
            )));
        }
        if cached.content_hash != current_hash {
            // Stored row and payload disagree: treat as corruption, not a hit.
            return Ok(None);
        }

        conn.execute(
            "UPDATE file_cache
             SET access_count = access_count + 1, last_accessed = ?2
             WHERE file_path = ?1",
            params![path, now_secs()],
        )
        .map_err(|e| IndexError::Cache(e.to_string()))?;

        Ok(Some(cached.result))
    }

    /// Store (or replace) the cached parse for `path`.
    pub fn put(
        &self,
        path: &str,
        hash: &str,
        mtime: i64,
        result: &ParseResult,
    ) -> Result<(), IndexError> {
        let payload = serde_json::to_string(&CachedParse {
            version: CACHE_FORMAT_VERSION,
            content_hash: hash.to_string(),
            result: result.clone(),
        })?;
        let now = now_secs();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO file_cache
                 (file_path, content_hash, last_modified, payload, created_at, access_count, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?5)
             ON CONFLICT(file_path) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 last_modified = excluded.last_modified,
                 payload = excluded.payload,
                 created_at = excluded.created_at,
                 last_accessed = excluded.last_accessed",
            params![path, hash, mtime, payload, now],
        )
        .map_err(|e| IndexError::Cache(e.to_string()))?;
        Ok(())
    }

    /// Remove entries; with `older_than_days` only entries last accessed
    /// before the cutoff. Returns how many rows were removed.
    pub fn clear(&self, older_than_days: Option<u64>) -> Result<usize, IndexError> {
        let conn = self.lock();
        let removed = match older_than_days {
            Some(days) => {
                let cutoff = now_secs() - (days as i64) * 86_400;
                conn.execute("DELETE FROM file_cache WHERE last_accessed < ?1", params![cutoff])
            }
            None => conn.execute("DELETE FROM file_cache", []),
        }
        .map_err(|e| IndexError::Cache(e.to_string()))?;
        Ok(removed)
    }

    /// (entry count, total payload bytes).
    pub fn stats(&self) -> Result<(usize, u64), IndexError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload)), 0) FROM file_cache",
            [],
            |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u64)),
        )
        .map_err(|e| IndexError::Cache(e.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
