//! Query surface: ranked lookup, full-text search, stats, and neighbor
//! expansion, with a memory-cache read-through keyed by a stable fingerprint
//! of (operation, arguments, schema version, write generation).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{MemoryCache, MemoryCacheStats};
use crate::error::IndexError;
use crate::storage::{Related, SearchMode, StorageEngine, StorageStats};
use crate::{CodeNode, NodeKind, RelKind};

/// Query results stay cached this long unless a write invalidates them first.
const QUERY_TTL: Duration = Duration::from_secs(300);

/// One search result row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub kind: NodeKind,
    pub path: String,
    pub score: f64,
    pub tags: Vec<String>,
    pub line: Option<u32>,
}

impl From<CodeNode> for SearchHit {
    fn from(node: CodeNode) -> Self {
        SearchHit {
            name: node.name,
            kind: node.kind,
            path: node.path,
            score: node.importance_score,
            tags: node.relevance_tags,
            line: node.line,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub node: CodeNode,
    pub kind: RelKind,
    pub weight: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RelatedReport {
    pub incoming: Vec<Neighbor>,
    pub outgoing: Vec<Neighbor>,
}

/// Stats for the CLI: storage totals plus live cache counters.
#[derive(Debug, Clone)]
pub struct StatsReport {
    pub storage: StorageStats,
    pub memory_cache: MemoryCacheStats,
    pub disk_cache_entries: Option<usize>,
}

pub struct QueryEngine<'a> {
    storage: &'a StorageEngine,
    cache: &'a MemoryCache,
    generation: AtomicU64,
}

impl<'a> QueryEngine<'a> {
    pub fn new(storage: &'a StorageEngine, cache: &'a MemoryCache) -> Self {
        QueryEngine { storage, cache, generation: AtomicU64::new(0) }
    }

    /// Drop all cached query results (called after any index write).
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    fn fingerprint(&self, op: &str, args: &str) -> String {
        format!(
            "query:{}:{}:{}:{}",
            self.generation.load(Ordering::Relaxed),
            self.storage.schema_version(),
            op,
            args
        )
    }

    fn cached<T, F>(&self, op: &str, args: String, compute: F) -> Result<T, IndexError>
    where
        T: Serialize + for<'de> Deserialize<'de>,
        F: FnOnce() -> Result<T, IndexError>,
    {
        let key = self.fingerprint(op, &args);
        if let Some(raw) = self.cache.get(&key) {
            if let Ok(value) = serde_json::from_str(&raw) {
                return Ok(value);
            }
            debug!(op, "corrupt cached query result, recomputing");
            self.cache.remove(&key);
        }
        let value = compute()?;
        if let Ok(raw) = serde_json::to_string(&value) {
            self.cache.put(&key, raw, Some(QUERY_TTL), Some("query"));
        }
        Ok(value)
    }

    /// Ranked list of the most important nodes.
    pub fn important(
        &self,
        limit: usize,
        min_score: Option<f64>,
        kind: Option<NodeKind>,
    ) -> Result<Vec<CodeNode>, IndexError> {
        let args = format!("{}:{:?}:{:?}", limit, min_score, kind);
        self.cached("important", args, || {
            self.storage.query_important(limit, min_score, kind, None)
        })
    }

    /// Full-text search (FTS MATCH when available, LIKE fallback otherwise).
    pub fn search(
        &self,
        terms: &[String],
        mode: SearchMode,
        kind: Option<NodeKind>,
        limit: usize,
        use_fts: bool,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let args = format!("{:?}:{:?}:{:?}:{}:{}", terms, mode, kind, limit, use_fts);
        self.cached("search", args, || {
            let nodes = self.storage.search(terms, mode, kind, limit, use_fts)?;
            Ok(nodes.into_iter().map(SearchHit::from).collect())
        })
    }

    /// Storage totals plus cache counters. Never cached; the counters are live.
    pub fn stats(&self) -> Result<StatsReport, IndexError> {
        Ok(StatsReport {
            storage: self.storage.stats()?,
            memory_cache: self.cache.stats(),
            disk_cache_entries: None,
        })
    }

    /// Incoming and outgoing neighbors of a node.
    pub fn related(&self, node_id: i64) -> Result<RelatedReport, IndexError> {
        let args = node_id.to_string();
        self.cached("related", args, || {
            let Related { incoming, outgoing } = self.storage.find_related(node_id)?;
            Ok(RelatedReport {
                incoming: incoming
                    .into_iter()
                    .map(|(node, kind, weight)| Neighbor { node, kind, weight })
                    .collect(),
                outgoing: outgoing
                    .into_iter()
                    .map(|(node, kind, weight)| Neighbor { node, kind, weight })
                    .collect(),
            })
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheConfig;
    use crate::{NodeKind, RelKind, Relationship};

    fn engine(dir: &std::path::Path) -> StorageEngine {
        StorageEngine::open(&dir.join("project.db"), &dir.join("backups")).unwrap()
    }

    fn seed(storage: &StorageEngine) {
        let writer = storage.begin_run().unwrap();
        let node = |id: i64, kind: NodeKind, name: &str, score: f64| CodeNode {
            id,
            kind,
            name: name.to_string(),
            path: "/p/a.py".to_string(),
            language: Some("python".into()),
            line: Some(1),
            column: None,
            summary: None,
            importance_score: score,
            relevance_tags: Vec::new(),
            weight: 1.0,
            frequency_score: 0.0,
            usage_stats: None,
            created_at: 0,
        };
        writer
            .insert_nodes(&[
                node(1, NodeKind::File, "a.py", 0.3),
                node(2, NodeKind::Function, "load_user", 0.9),
                node(3, NodeKind::Function, "save_user", 0.5),
            ])
            .unwrap();
        writer
            .insert_relationships(&[Relationship {
                source: 1,
                target: 2,
                kind: RelKind::Contains,
                weight: 1.0,
                created_at: 0,
            }])
            .unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn test_important_cached_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = engine(tmp.path());
        seed(&storage);
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let queries = QueryEngine::new(&storage, &cache);

        let first = queries.important(10, None, None).unwrap();
        assert_eq!(first[0].name, "load_user");

        let misses_before = cache.stats().misses;
        let second = queries.important(10, None, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().misses, misses_before, "second call must be a cache hit");
    }

    #[test]
    fn test_invalidate_busts_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = engine(tmp.path());
        seed(&storage);
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let queries = QueryEngine::new(&storage, &cache);

        queries.important(10, None, None).unwrap();
        queries.invalidate();
        let misses_before = cache.stats().misses;
        queries.important(10, None, None).unwrap();
        assert!(cache.stats().misses > misses_before, "generation bump must miss");
    }

    #[test]
    fn test_search_hits_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = engine(tmp.path());
        seed(&storage);
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let queries = QueryEngine::new(&storage, &cache);

        let hits = queries
            .search(&["user".to_string()], SearchMode::Any, None, 10, true)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "load_user");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_related_report() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = engine(tmp.path());
        seed(&storage);
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let queries = QueryEngine::new(&storage, &cache);

        let related = queries.related(2).unwrap();
        assert_eq!(related.incoming.len(), 1);
        assert_eq!(related.incoming[0].node.name, "a.py");
        assert_eq!(related.incoming[0].kind, RelKind::Contains);
        assert!(related.outgoing.is_empty());
    }

    #[test]
    fn test_stats_include_cache_counters() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = engine(tmp.path());
        seed(&storage);
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let queries = QueryEngine::new(&storage, &cache);

        queries.important(10, None, None).unwrap();
        let report = queries.stats().unwrap();
        assert_eq!(report.storage.total_nodes, 3);
        assert!(report.memory_cache.misses >= 1);
    }
}
