//! Cache layer tests: LRU/TTL policy, disk round-trips, hash verification,
//! corruption handling.

use std::time::Duration;

use super::*;
use crate::{ParseResult, content_hash, file_node};

fn sample_result(path: &str) -> ParseResult {
    let mut nodes = std::collections::BTreeMap::new();
    nodes.insert(0, file_node(path, "python"));
    ParseResult {
        success: true,
        language: "python".into(),
        nodes,
        relationships: Vec::new(),
        name_refs: Vec::new(),
        patterns: Vec::new(),
        libraries: Vec::new(),
        infrastructure: Vec::new(),
        error: None,
    }
}

fn small_cache(max_bytes: usize) -> MemoryCache {
    MemoryCache::new(MemoryCacheConfig {
        max_bytes,
        default_ttl: Duration::from_secs(3600),
        ttl_by_type: Default::default(),
    })
}

// ─── Memory tier ────────────────────────────────────────────────────

#[test]
fn test_memory_put_get_roundtrip() {
    let cache = MemoryCache::with_defaults();
    assert!(cache.put("k", "v".into(), None, None));
    assert_eq!(cache.get("k"), Some("v".to_string()));
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entry_count, 1);
}

#[test]
fn test_memory_miss_counted() {
    let cache = MemoryCache::with_defaults();
    assert_eq!(cache.get("absent"), None);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.0);
}

#[test]
fn test_memory_oversized_entry_rejected() {
    let cache = small_cache(1_000);
    // Entry cap is max/10 = 100 bytes; this value exceeds it.
    let before = cache.stats();
    assert!(!cache.put("big", "x".repeat(500), None, None));
    let after = cache.stats();
    assert_eq!(after.entry_count, before.entry_count);
    assert_eq!(after.size_bytes, before.size_bytes);
}

#[test]
fn test_memory_lru_eviction_order() {
    // Cap chosen so roughly 3-4 small entries fit.
    let cache = small_cache(3_000);
    let filler = "y".repeat(200);
    assert!(cache.put("a", filler.clone(), None, None));
    assert!(cache.put("b", filler.clone(), None, None));
    assert!(cache.put("c", filler.clone(), None, None));

    // Touch "a" so "b" becomes least recently used.
    assert!(cache.get("a").is_some());

    // Keep inserting until something is evicted.
    let mut i = 0;
    while cache.stats().evictions == 0 {
        assert!(cache.put(&format!("fill{}", i), filler.clone(), None, None));
        i += 1;
        assert!(i < 100, "eviction never happened");
    }
    // "b" must be gone before "a".
    assert!(cache.get("a").is_some() || cache.get("b").is_none());
}

#[test]
fn test_memory_ttl_expiry_is_miss() {
    let cache = MemoryCache::with_defaults();
    assert!(cache.put("short", "v".into(), Some(Duration::from_millis(10)), None));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(cache.get("short"), None);
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn test_memory_full_of_expired_entries_accepts_put() {
    let cache = small_cache(2_000);
    let filler = "z".repeat(100);
    for i in 0..12 {
        assert!(cache.put(&format!("e{}", i), filler.clone(), Some(Duration::from_millis(5)), None));
    }
    std::thread::sleep(Duration::from_millis(30));
    // The cache is effectively full but everything in it is expired;
    // eager expiry must make room without LRU evictions.
    assert!(cache.put("fresh", filler, Some(Duration::from_secs(60)), None));
    assert!(cache.get("fresh").is_some());
    assert_eq!(cache.stats().evictions, 0);
}

#[test]
fn test_memory_cleanup_expired() {
    let cache = MemoryCache::with_defaults();
    cache.put("a", "1".into(), Some(Duration::from_millis(5)), None);
    cache.put("b", "2".into(), Some(Duration::from_secs(600)), None);
    std::thread::sleep(Duration::from_millis(30));
    let removed = cache.cleanup_expired();
    assert_eq!(removed, 1);
    assert_eq!(cache.stats().entry_count, 1);
}

#[test]
fn test_memory_size_never_exceeds_cap() {
    let cache = small_cache(2_000);
    let filler = "w".repeat(100);
    for i in 0..50 {
        cache.put(&format!("k{}", i), filler.clone(), None, None);
        assert!(cache.stats().size_bytes <= 2_000, "cap exceeded at insert {}", i);
    }
}

#[test]
fn test_memory_entity_type_ttl_override() {
    let mut ttl_by_type = std::collections::HashMap::new();
    ttl_by_type.insert("query".to_string(), Duration::from_millis(10));
    let cache = MemoryCache::new(MemoryCacheConfig {
        max_bytes: 10_000,
        default_ttl: Duration::from_secs(3600),
        ttl_by_type,
    });
    cache.put("q1", "v".into(), None, Some("query"));
    cache.put("p1", "v".into(), None, Some("parse_result"));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(cache.get("q1"), None, "query TTL override should expire");
    assert!(cache.get("p1").is_some(), "default TTL should still hold");
}

#[test]
fn test_memory_clear() {
    let cache = MemoryCache::with_defaults();
    cache.put("a", "1".into(), None, None);
    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.size_bytes, 0);
}

// ─── Disk tier ──────────────────────────────────────────────────────

#[test]
fn test_disk_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskCache::open(&tmp.path().join("parse_cache.db")).unwrap();

    let result = sample_result("/p/a.py");
    let hash = content_hash(b"def f(): pass\n");
    cache.put("/p/a.py", &hash, 1_700_000_000, &result).unwrap();

    let hit = cache.get("/p/a.py", &hash).unwrap();
    assert_eq!(hit, Some(result));
}

#[test]
fn test_disk_hash_mismatch_is_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskCache::open(&tmp.path().join("parse_cache.db")).unwrap();

    let result = sample_result("/p/a.py");
    cache.put("/p/a.py", &content_hash(b"old"), 0, &result).unwrap();
    assert_eq!(cache.get("/p/a.py", &content_hash(b"new")).unwrap(), None);
}

#[test]
fn test_disk_corrupt_payload_is_error_not_hit() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("parse_cache.db");
    let cache = DiskCache::open(&db).unwrap();
    let hash = content_hash(b"x");
    cache.put("/p/a.py", &hash, 0, &sample_result("/p/a.py")).unwrap();
    drop(cache);

    // Corrupt the stored payload directly.
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute("UPDATE file_cache SET payload = 'not json'", []).unwrap();
    drop(conn);

    let cache = DiskCache::open(&db).unwrap();
    assert!(cache.get("/p/a.py", &hash).is_err());
}

#[test]
fn test_disk_newer_version_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("parse_cache.db");
    let cache = DiskCache::open(&db).unwrap();
    let hash = content_hash(b"x");
    cache.put("/p/a.py", &hash, 0, &sample_result("/p/a.py")).unwrap();
    drop(cache);

    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute(
        "UPDATE file_cache SET payload = json_set(payload, '$.version', 999)",
        [],
    )
    .unwrap();
    drop(conn);

    let cache = DiskCache::open(&db).unwrap();
    assert!(cache.get("/p/a.py", &hash).is_err());
}

#[test]
fn test_disk_clear_by_age() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("parse_cache.db");
    let cache = DiskCache::open(&db).unwrap();
    cache.put("/p/old.py", &content_hash(b"a"), 0, &sample_result("/p/old.py")).unwrap();
    cache.put("/p/new.py", &content_hash(b"b"), 0, &sample_result("/p/new.py")).unwrap();
    drop(cache);

    // Age one entry artificially.
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute(
        "UPDATE file_cache SET last_accessed = 1000 WHERE file_path = '/p/old.py'",
        [],
    )
    .unwrap();
    drop(conn);

    let cache = DiskCache::open(&db).unwrap();
    let removed = cache.clear(Some(30)).unwrap();
    assert_eq!(removed, 1);
    let (count, _) = cache.stats().unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_disk_clear_all() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskCache::open(&tmp.path().join("parse_cache.db")).unwrap();
    cache.put("/p/a.py", &content_hash(b"a"), 0, &sample_result("/p/a.py")).unwrap();
    assert_eq!(cache.clear(None).unwrap(), 1);
    assert_eq!(cache.stats().unwrap().0, 0);
}

// ─── Composite layer ────────────────────────────────────────────────

#[test]
fn test_layer_write_through_and_memory_hit() {
    let tmp = tempfile::tempdir().unwrap();
    let layer = CacheLayer::open(&tmp.path().join("parse_cache.db"), MemoryCacheConfig::default());

    let result = sample_result("/p/a.py");
    let hash = content_hash(b"content");
    layer.put_parse("/p/a.py", &hash, 0, &result);

    assert_eq!(layer.get_parse("/p/a.py", &hash), Some(result));
    assert!(layer.memory().stats().hits >= 1);
}

#[test]
fn test_layer_disk_hit_warms_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("parse_cache.db");
    let result = sample_result("/p/a.py");
    let hash = content_hash(b"content");

    {
        let layer = CacheLayer::open(&db, MemoryCacheConfig::default());
        layer.put_parse("/p/a.py", &hash, 0, &result);
    }

    // Fresh layer: memory is cold, disk has the entry.
    let layer = CacheLayer::open(&db, MemoryCacheConfig::default());
    assert_eq!(layer.get_parse("/p/a.py", &hash), Some(result.clone()));
    // Second read must come from the warmed memory tier.
    let misses_before = layer.memory().stats().misses;
    assert_eq!(layer.get_parse("/p/a.py", &hash), Some(result));
    assert_eq!(layer.memory().stats().misses, misses_before);
}

#[test]
fn test_layer_hash_change_is_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let layer = CacheLayer::open(&tmp.path().join("parse_cache.db"), MemoryCacheConfig::default());
    layer.put_parse("/p/a.py", &content_hash(b"v1"), 0, &sample_result("/p/a.py"));
    assert_eq!(layer.get_parse("/p/a.py", &content_hash(b"v2")), None);
}

#[test]
fn test_layer_corrupt_disk_entry_degrades_to_miss_and_repairs() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("parse_cache.db");
    let result = sample_result("/p/a.py");
    let hash = content_hash(b"content");

    {
        let layer = CacheLayer::open(&db, MemoryCacheConfig::default());
        layer.put_parse("/p/a.py", &hash, 0, &result);
    }

    // Flip the stored hash: lookup must degrade to a miss, not an error.
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute("UPDATE file_cache SET content_hash = 'deadbeef'", []).unwrap();
    drop(conn);

    let layer = CacheLayer::open(&db, MemoryCacheConfig::default());
    assert_eq!(layer.get_parse("/p/a.py", &hash), None);

    // A fresh put repairs the entry silently.
    layer.put_parse("/p/a.py", &hash, 0, &result);
    assert_eq!(layer.get_parse("/p/a.py", &hash), Some(result));
}

#[test]
fn test_layer_memory_only_mode() {
    let layer = CacheLayer::memory_only(MemoryCacheConfig::default());
    let result = sample_result("/p/a.py");
    let hash = content_hash(b"x");
    layer.put_parse("/p/a.py", &hash, 0, &result);
    assert_eq!(layer.get_parse("/p/a.py", &hash), Some(result));
    assert!(layer.disk().is_none());
}
