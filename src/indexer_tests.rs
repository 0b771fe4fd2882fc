//! End-to-end orchestrator tests over real temp directories: fresh index,
//! cross-file linking, cache idempotence, corruption repair, soft errors,
//! cancellation.

use std::sync::atomic::Ordering;

use super::*;
use crate::cache::{CacheLayer, MemoryCacheConfig};
use crate::storage::{SearchMode, StorageEngine};
use crate::{NodeKind, RelKind};

struct Harness {
    _tmp: tempfile::TempDir,
    project: std::path::PathBuf,
    storage: StorageEngine,
    cache: CacheLayer,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir(&project).unwrap();
        let storage =
            StorageEngine::open(&tmp.path().join("project.db"), &tmp.path().join("backups"))
                .unwrap();
        let cache = CacheLayer::open(
            &tmp.path().join("cache").join("parse_cache.db"),
            MemoryCacheConfig::default(),
        );
        Harness { _tmp: tmp, project, storage, cache }
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.project.join(name), content).unwrap();
    }

    fn run(&self) -> IndexSummary {
        self.run_with(&IndexOptions::default())
    }

    fn run_with(&self, options: &IndexOptions) -> IndexSummary {
        let indexer = Indexer::new(&self.storage, &self.cache);
        indexer.index(&self.project, options, &NullSink).unwrap()
    }

    fn node_count(&self, kind: NodeKind) -> i64 {
        let conn = self.storage.pool().acquire().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM code_nodes WHERE node_type = ?1",
            rusqlite::params![kind.as_str()],
            |r| r.get(0),
        )
        .unwrap()
    }

    fn edge_exists(&self, src_name: &str, dst_name: &str, kind: RelKind) -> bool {
        let conn = self.storage.pool().acquire().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM relationships r
             JOIN code_nodes s ON s.id = r.source_id
             JOIN code_nodes t ON t.id = r.target_id
             WHERE s.name = ?1 AND t.name = ?2 AND r.relationship_type = ?3",
            rusqlite::params![src_name, dst_name, kind.as_str()],
            |r| r.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }
}

// Scenario: one Python file with a function, a class and a method.
#[test]
fn test_single_file_shapes() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\nclass C:\n    def m(self): pass\n");

    let summary = h.run();
    assert_eq!(summary.files_total, 1);
    assert_eq!(summary.files_parsed, 1);
    assert!(summary.errors.is_empty());
    assert!(!summary.canceled);

    assert_eq!(h.node_count(NodeKind::File), 1);
    assert_eq!(h.node_count(NodeKind::Function), 1);
    assert_eq!(h.node_count(NodeKind::Class), 1);
    assert_eq!(h.node_count(NodeKind::Method), 1);

    assert!(h.edge_exists("a.py", "f", RelKind::Contains));
    assert!(h.edge_exists("a.py", "C", RelKind::Contains));
    assert!(h.edge_exists("C", "C.m", RelKind::Contains));
}

// Scenario: imports and calls across two files.
#[test]
fn test_cross_file_links_persisted() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\nclass C:\n    def m(self): pass\n");
    h.write("b.py", "from a import f\ndef g(): f()\n");

    h.run();
    assert!(h.edge_exists("b.py", "a.py", RelKind::Imports));
    assert!(h.edge_exists("g", "f", RelKind::Calls));

    let hits = h
        .storage
        .search(&["f".to_string()], SearchMode::Any, None, 20, true)
        .unwrap();
    assert!(hits.iter().any(|n| n.name == "f"));

    let classes = h
        .storage
        .search(&["class C".to_string()], SearchMode::Any, Some(NodeKind::Class), 20, true)
        .unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "C");
}

// Scenario: unchanged re-run serves everything from cache, counts stable.
#[test]
fn test_rerun_is_idempotent_and_fully_cached() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\nclass C:\n    def m(self): pass\n");
    h.write("b.py", "from a import f\ndef g(): f()\n");

    let first = h.run();
    assert_eq!(first.files_cached, 0);
    let stats_first = h.storage.stats().unwrap();

    let second = h.run();
    assert_eq!(second.files_cached, second.files_total, "second run must be 100% cache hits");
    assert_eq!(second.files_parsed, 0);

    let stats_second = h.storage.stats().unwrap();
    assert_eq!(stats_first.total_nodes, stats_second.total_nodes);
    assert_eq!(stats_first.total_relationships, stats_second.total_relationships);
    assert_eq!(stats_first.nodes_by_kind, stats_second.nodes_by_kind);
}

// Scenario: corrupted disk-cache hash is detected, reparsed and repaired.
#[test]
fn test_corrupt_cache_entry_self_heals() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    h.run();

    // Flip the stored content hash for every entry.
    let cache_db = h._tmp.path().join("cache").join("parse_cache.db");
    {
        let conn = rusqlite::Connection::open(&cache_db).unwrap();
        conn.execute("UPDATE file_cache SET content_hash = 'deadbeef'", []).unwrap();
    }
    // Fresh cache layer so the memory tier is cold too.
    let cache = CacheLayer::open(&cache_db, MemoryCacheConfig::default());
    let indexer = Indexer::new(&h.storage, &cache);
    let summary = indexer.index(&h.project, &IndexOptions::default(), &NullSink).unwrap();

    assert_eq!(summary.files_cached, 0, "mismatch must be treated as a miss");
    assert_eq!(summary.files_parsed, 1);
    assert!(summary.errors.is_empty(), "no error surfaces for a repaired entry");

    // Third run hits the silently repaired entry.
    let summary = indexer.index(&h.project, &IndexOptions::default(), &NullSink).unwrap();
    assert_eq!(summary.files_cached, 1);
}

#[test]
fn test_force_bypasses_cache() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    h.run();

    let summary = h.run_with(&IndexOptions { force: true, ..Default::default() });
    assert_eq!(summary.files_cached, 0);
    assert_eq!(summary.files_parsed, 1);
}

#[test]
fn test_empty_project_succeeds_with_zero_counts() {
    let h = Harness::new();
    let summary = h.run();
    assert_eq!(summary.files_total, 0);
    assert_eq!(summary.nodes, 0);
    assert_eq!(summary.edges, 0);
    assert!(!summary.canceled);
    assert_eq!(h.storage.stats().unwrap().total_nodes, 0);
}

#[test]
fn test_unparseable_file_is_soft_error_with_file_node() {
    let h = Harness::new();
    h.write("junk.py", "%%% ??? (((");

    let summary = h.run();
    assert!(!summary.canceled);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].path.ends_with("junk.py"));
    assert_eq!(h.node_count(NodeKind::File), 1, "file node must still exist");
}

#[test]
fn test_deleted_file_rows_removed_on_next_run() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    h.write("b.py", "def g(): pass\n");
    h.run();
    assert_eq!(h.node_count(NodeKind::File), 2);

    std::fs::remove_file(h.project.join("b.py")).unwrap();
    h.run();
    assert_eq!(h.node_count(NodeKind::File), 1);
    assert_eq!(h.node_count(NodeKind::Function), 1);
}

#[test]
fn test_custom_ignore_respected() {
    let h = Harness::new();
    std::fs::create_dir(h.project.join("generated")).unwrap();
    std::fs::write(h.project.join("generated").join("gen.py"), "def gen(): pass\n").unwrap();
    h.write("a.py", "def f(): pass\n");

    let summary = h.run_with(&IndexOptions {
        custom_ignore: vec!["generated/**".to_string()],
        ..Default::default()
    });
    assert_eq!(summary.files_total, 1);
}

#[test]
fn test_invalid_custom_ignore_is_user_error() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    let indexer = Indexer::new(&h.storage, &h.cache);
    let err = indexer
        .index(
            &h.project,
            &IndexOptions { custom_ignore: vec!["*".repeat(11)], ..Default::default() },
            &NullSink,
        )
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidPattern { .. }));
}

#[test]
fn test_pattern_selection_limits_files() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    h.write("b.js", "function g() {}\n");

    let summary = h.run_with(&IndexOptions {
        patterns: Some(vec!["*.py".to_string()]),
        ..Default::default()
    });
    assert_eq!(summary.files_total, 1);
}

#[test]
fn test_nonexistent_root_is_invalid_path() {
    let h = Harness::new();
    let indexer = Indexer::new(&h.storage, &h.cache);
    let err = indexer
        .index(
            &h.project.join("no-such-dir"),
            &IndexOptions::default(),
            &NullSink,
        )
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidPath { .. }));
}

#[test]
fn test_multi_language_project() {
    let h = Harness::new();
    h.write("app.py", "def f(): pass\n");
    h.write("web.js", "function g() {}\n");
    h.write("core.c", "int h(void) { return 0; }\n");
    h.write("tool.ahk", "DoWork() {\n    return\n}\n");

    let summary = h.run();
    assert_eq!(summary.files_total, 4);
    assert_eq!(h.node_count(NodeKind::File), 4);
    assert_eq!(h.node_count(NodeKind::Function), 4);

    let stats = h.storage.stats().unwrap();
    assert_eq!(stats.nodes_by_language.len(), 4);
}

#[test]
fn test_detector_records_persisted() {
    let h = Harness::new();
    h.write("config.py", "import flask\nclass Config:\n    _instance = None\n");

    h.run();
    let conn = h.storage.pool().acquire().unwrap();
    let patterns: i64 =
        conn.query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get(0)).unwrap();
    let libraries: i64 =
        conn.query_row("SELECT COUNT(*) FROM libraries", [], |r| r.get(0)).unwrap();
    assert!(patterns >= 1);
    assert_eq!(libraries, 1);
}

#[test]
fn test_importance_scores_assigned() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\ndef g(): f()\ndef h(): f()\n");

    h.run();
    let important = h.storage.query_important(5, None, Some(NodeKind::Function), None).unwrap();
    assert_eq!(important[0].name, "f", "most-called function should rank first");
    assert!(important[0].importance_score > 0.0);
}

#[test]
fn test_cancellation_before_dispatch_rolls_back() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");

    let indexer = Indexer::new(&h.storage, &h.cache);
    indexer.cancel_flag().store(true, Ordering::Relaxed);
    let summary = indexer.index(&h.project, &IndexOptions::default(), &NullSink).unwrap();

    assert!(summary.canceled);
    assert_eq!(summary.nodes, 0);
    assert_eq!(h.storage.stats().unwrap().total_nodes, 0, "nothing may persist after cancel");
}

#[test]
fn test_project_node_singleton() {
    let h = Harness::new();
    h.write("a.py", "def f(): pass\n");
    h.run();
    h.run();
    assert_eq!(h.node_count(NodeKind::Project), 1);
}

#[test]
fn test_determinism_across_fresh_runs() {
    let make = || {
        let h = Harness::new();
        h.write("a.py", "def f(): pass\nclass C:\n    def m(self): f()\n");
        h.write("b.py", "from a import f\ndef g(): f()\n");
        h.run_with(&IndexOptions { no_cache: true, ..Default::default() });
        let conn = h.storage.pool().acquire().unwrap();
        let mut stmt = conn
            .prepare("SELECT node_type, name, path FROM code_nodes ORDER BY node_type, name, path")
            .unwrap();
        let nodes: Vec<(String, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let mut stmt = conn
            .prepare(
                "SELECT s.name, t.name, r.relationship_type FROM relationships r
                 JOIN code_nodes s ON s.id = r.source_id
                 JOIN code_nodes t ON t.id = r.target_id
                 ORDER BY s.name, t.name, r.relationship_type",
            )
            .unwrap();
        let edges: Vec<(String, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        (nodes, edges)
    };

    // Paths differ between harnesses, so compare shapes by (kind, name) only.
    let strip = |rows: Vec<(String, String, String)>| {
        rows.into_iter().map(|(a, b, _)| (a, b)).collect::<Vec<_>>()
    };
    let (nodes_a, edges_a) = make();
    let (nodes_b, edges_b) = make();
    assert_eq!(strip(nodes_a), strip(nodes_b));
    assert_eq!(edges_a.len(), edges_b.len());
    let pair = |rows: &[(String, String, String)]| {
        let mut v: Vec<(String, String, String)> = rows.to_vec();
        v.sort();
        v
    };
    assert_eq!(pair(&edges_a), pair(&edges_b));
}
