//! Storage engine tests: migrations (fresh, legacy, failing), writes inside
//! the run transaction, FTS sync, search modes, related lookup, annotations.

use super::*;
use crate::{NodeKind, RelKind};

fn test_node(id: i64, kind: NodeKind, name: &str, path: &str, score: f64) -> CodeNode {
    CodeNode {
        id,
        kind,
        name: name.to_string(),
        path: path.to_string(),
        language: Some("python".into()),
        line: Some(1),
        column: None,
        summary: None,
        importance_score: score,
        relevance_tags: Vec::new(),
        weight: 1.0,
        frequency_score: 0.0,
        usage_stats: None,
        created_at: 1_700_000_000,
    }
}

fn rel(source: i64, target: i64, kind: RelKind) -> Relationship {
    Relationship { source, target, kind, weight: 1.0, created_at: 1_700_000_000 }
}

fn open_engine(dir: &std::path::Path) -> StorageEngine {
    StorageEngine::open(&dir.join("project.db"), &dir.join("backups")).unwrap()
}

/// A v1.0.0 database the way the engine's earliest release created it.
fn create_legacy_v1_0_0(db_path: &std::path::Path) {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE code_nodes (
             id INTEGER PRIMARY KEY,
             node_type TEXT NOT NULL,
             name TEXT NOT NULL,
             path TEXT NOT NULL,
             language TEXT,
             line_number INTEGER,
             column_number INTEGER,
             summary TEXT,
             importance_score REAL NOT NULL DEFAULT 0.0,
             relevance_tags TEXT,
             created_at INTEGER NOT NULL,
             UNIQUE (node_type, name, path)
         );
         CREATE TABLE relationships (
             source_id INTEGER NOT NULL,
             target_id INTEGER NOT NULL,
             relationship_type TEXT NOT NULL,
             weight REAL NOT NULL DEFAULT 1.0,
             created_at INTEGER NOT NULL,
             PRIMARY KEY (source_id, target_id, relationship_type)
         );
         CREATE TABLE indexing_metadata (
             key TEXT PRIMARY KEY,
             value TEXT,
             updated_at INTEGER
         );
         INSERT INTO code_nodes (id, node_type, name, path, importance_score, created_at)
             VALUES (1, 'function', 'legacy_func', '/old/a.py', 0.5, 1000);",
    )
    .unwrap();
}

// ─── Migrations ─────────────────────────────────────────────────────

#[test]
fn test_fresh_database_reaches_current_version() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    assert_eq!(engine.schema_version(), current_version());
    assert_eq!(engine.schema_version(), "1.15.0");
}

#[test]
fn test_fresh_database_records_full_history() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    let conn = engine.pool().acquire().unwrap();
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM migration_history", [], |r| r.get(0)).unwrap();
    assert_eq!(count as usize, migrations::MIGRATIONS.len());
}

#[test]
fn test_legacy_v1_0_0_upgrades_with_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("project.db");
    let backups = tmp.path().join("backups");
    create_legacy_v1_0_0(&db);

    let engine = StorageEngine::open(&db, &backups).unwrap();
    assert_eq!(engine.schema_version(), current_version());

    // Pre-migration backup exists.
    let backup_count = std::fs::read_dir(&backups).unwrap().count();
    assert_eq!(backup_count, 1);

    // Legacy data survived and the FTS mirror was backfilled from it.
    let conn = engine.pool().acquire().unwrap();
    let name: String = conn
        .query_row("SELECT name FROM code_nodes WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "legacy_func");
    let fts: i64 =
        conn.query_row("SELECT COUNT(*) FROM code_nodes_fts", [], |r| r.get(0)).unwrap();
    assert_eq!(fts, 1);

    // Added columns are present with defaults.
    let weight: f64 =
        conn.query_row("SELECT weight FROM code_nodes WHERE id = 1", [], |r| r.get(0)).unwrap();
    assert_eq!(weight, 1.0);
}

#[test]
fn test_reopen_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    {
        open_engine(tmp.path());
    }
    let engine = open_engine(tmp.path());
    assert_eq!(engine.schema_version(), current_version());
    // No second backup for a no-op open.
    let backups = tmp.path().join("backups");
    assert!(!backups.exists() || std::fs::read_dir(&backups).unwrap().count() == 0);
}

#[test]
fn test_failed_migration_restores_backup_and_refuses() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("project.db");
    let backups = tmp.path().join("backups");
    create_legacy_v1_0_0(&db);

    // Sabotage: a pre-existing trigger with the name 1.15.0 wants to create.
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER code_nodes_fts_ai AFTER INSERT ON code_nodes BEGIN SELECT 1; END;",
        )
        .unwrap();
    }

    let err = StorageEngine::open(&db, &backups).unwrap_err();
    match err {
        IndexError::MigrationFailed { version, .. } => assert_eq!(version, "1.15.0"),
        other => panic!("expected MigrationFailed, got {other:?}"),
    }

    // Backup was taken and the database was restored to its legacy shape.
    assert_eq!(std::fs::read_dir(&backups).unwrap().count(), 1);
    let conn = rusqlite::Connection::open(&db).unwrap();
    let has_weight = {
        let mut stmt = conn.prepare("PRAGMA table_info(code_nodes)").unwrap();
        let cols: Vec<String> =
            stmt.query_map([], |r| r.get::<_, String>(1)).unwrap().map(|c| c.unwrap()).collect();
        cols.contains(&"weight".to_string())
    };
    assert!(!has_weight, "restored database should not have migrated columns");
}

#[test]
fn test_version_detection_from_shape() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("legacy.db");
    create_legacy_v1_0_0(&db);
    let conn = rusqlite::Connection::open(&db).unwrap();
    assert_eq!(migrations::detect_version(&conn).unwrap(), Some("1.0.0".to_string()));

    conn.execute_batch("ALTER TABLE code_nodes ADD COLUMN weight REAL DEFAULT 1.0").unwrap();
    assert_eq!(migrations::detect_version(&conn).unwrap(), Some("1.1.0".to_string()));
}

// ─── Writes and invariants ──────────────────────────────────────────

#[test]
fn test_insert_and_fts_row_count_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let writer = engine.begin_run().unwrap();
    writer
        .insert_nodes(&[
            test_node(1, NodeKind::File, "a.py", "/p/a.py", 0.2),
            test_node(2, NodeKind::Function, "f", "/p/a.py", 0.8),
        ])
        .unwrap();
    writer.insert_relationships(&[rel(1, 2, RelKind::Contains)]).unwrap();
    writer.commit().unwrap();

    let conn = engine.pool().acquire().unwrap();
    let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |r| r.get(0)).unwrap();
    let fts: i64 =
        conn.query_row("SELECT COUNT(*) FROM code_nodes_fts", [], |r| r.get(0)).unwrap();
    assert_eq!(nodes, 2);
    assert_eq!(fts, nodes);
}

#[test]
fn test_delete_file_entities_cascades_and_syncs_fts() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let writer = engine.begin_run().unwrap();
    writer
        .insert_nodes(&[
            test_node(1, NodeKind::File, "a.py", "/p/a.py", 0.2),
            test_node(2, NodeKind::Function, "f", "/p/a.py", 0.8),
            test_node(3, NodeKind::File, "b.py", "/p/b.py", 0.2),
        ])
        .unwrap();
    writer
        .insert_relationships(&[rel(1, 2, RelKind::Contains), rel(3, 1, RelKind::Imports)])
        .unwrap();
    writer.commit().unwrap();

    let writer = engine.begin_run().unwrap();
    writer.delete_file_entities("/p/a.py").unwrap();
    writer.commit().unwrap();

    let conn = engine.pool().acquire().unwrap();
    let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |r| r.get(0)).unwrap();
    let rels: i64 =
        conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0)).unwrap();
    let fts: i64 =
        conn.query_row("SELECT COUNT(*) FROM code_nodes_fts", [], |r| r.get(0)).unwrap();
    assert_eq!(nodes, 1);
    assert_eq!(rels, 0, "edges touching deleted nodes must cascade");
    assert_eq!(fts, 1);
}

#[test]
fn test_duplicate_triple_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let writer = engine.begin_run().unwrap();
    writer.insert_nodes(&[test_node(1, NodeKind::Function, "f", "/p/a.py", 0.1)]).unwrap();
    // Same (kind, name, path) under a different id: ignored, not duplicated.
    writer.insert_nodes(&[test_node(2, NodeKind::Function, "f", "/p/a.py", 0.9)]).unwrap();
    writer.commit().unwrap();

    let conn = engine.pool().acquire().unwrap();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_uncommitted_writer_rolls_back() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    {
        let writer = engine.begin_run().unwrap();
        writer.insert_nodes(&[test_node(1, NodeKind::File, "a.py", "/p/a.py", 0.1)]).unwrap();
        // dropped without commit
    }

    let conn = engine.pool().acquire().unwrap();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_next_node_id_never_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let writer = engine.begin_run().unwrap();
    assert_eq!(writer.next_node_id().unwrap(), 1);
    writer.insert_nodes(&[test_node(7, NodeKind::File, "a.py", "/p/a.py", 0.1)]).unwrap();
    writer.set_metadata("next_node_id", "8").unwrap();
    writer.commit().unwrap();

    // Delete everything; the counter still advances past old ids.
    let writer = engine.begin_run().unwrap();
    writer.delete_file_entities("/p/a.py").unwrap();
    assert_eq!(writer.next_node_id().unwrap(), 8);
    writer.commit().unwrap();
}

// ─── Queries ────────────────────────────────────────────────────────

fn seed_corpus(engine: &StorageEngine) {
    let writer = engine.begin_run().unwrap();
    let mut user_service = test_node(1, NodeKind::Class, "user_service", "/p/svc.py", 0.9);
    user_service.summary = Some("manages user accounts in the database".into());
    user_service.relevance_tags = vec!["structural".into()];
    let database_pool = test_node(2, NodeKind::Class, "database_pool", "/p/db.py", 0.7);
    let helper = test_node(3, NodeKind::Function, "format_output", "/p/util.py", 0.2);
    writer.insert_nodes(&[user_service, database_pool, helper]).unwrap();
    writer.insert_relationships(&[rel(1, 2, RelKind::Calls)]).unwrap();
    writer.set_metadata("last_indexed_at", "1700000000").unwrap();
    writer.commit().unwrap();
}

#[test]
fn test_query_important_ordering_and_filters() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let top = engine.query_important(10, None, None, None).unwrap();
    assert_eq!(top[0].name, "user_service");
    assert!(top[0].importance_score >= top[1].importance_score);

    let classes = engine.query_important(10, None, Some(NodeKind::Class), None).unwrap();
    assert_eq!(classes.len(), 2);

    let scored = engine.query_important(10, Some(0.5), None, None).unwrap();
    assert_eq!(scored.len(), 2);

    let prefixed = engine.query_important(10, None, None, Some("/p/db")).unwrap();
    assert_eq!(prefixed.len(), 1);
    assert_eq!(prefixed[0].name, "database_pool");
}

#[test]
fn test_search_fts_any_vs_all() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let any = engine
        .search(&["user database".to_string()], SearchMode::Any, None, 10, true)
        .unwrap();
    let any_names: Vec<&str> = any.iter().map(|n| n.name.as_str()).collect();
    assert!(any_names.contains(&"user_service"));
    assert!(any_names.contains(&"database_pool"));

    let all = engine
        .search(&["user database".to_string()], SearchMode::All, None, 10, true)
        .unwrap();
    let all_names: Vec<&str> = all.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(all_names, vec!["user_service"], "only the node with both tokens");
}

#[test]
fn test_search_like_fallback_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let hits = engine
        .search(&["format".to_string()], SearchMode::Any, None, 10, false)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "format_output");
}

#[test]
fn test_search_kind_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let hits = engine
        .search(&["database".to_string()], SearchMode::Any, Some(NodeKind::Function), 10, true)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_search_results_ordered_by_importance() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let hits = engine
        .search(&["database".to_string()], SearchMode::Any, None, 10, true)
        .unwrap();
    assert!(hits.len() >= 2);
    assert!(hits[0].importance_score >= hits[1].importance_score);
}

#[test]
fn test_stats_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.total_relationships, 1);
    assert_eq!(stats.nodes_by_kind.get("class"), Some(&2));
    assert_eq!(stats.relationships_by_kind.get("calls"), Some(&1));
    assert_eq!(stats.last_indexed_at, Some(1_700_000_000));
}

#[test]
fn test_find_related_directions() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    let related = engine.find_related(2).unwrap();
    assert_eq!(related.incoming.len(), 1);
    assert_eq!(related.incoming[0].0.name, "user_service");
    assert_eq!(related.incoming[0].1, RelKind::Calls);
    assert!(related.outgoing.is_empty());

    let related = engine.find_related(1).unwrap();
    assert_eq!(related.outgoing.len(), 1);
    assert_eq!(related.outgoing[0].0.name, "database_pool");
}

// ─── Annotations ────────────────────────────────────────────────────

#[test]
fn test_memory_upsert_and_get() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());
    seed_corpus(&engine);

    engine
        .store_memory(1, "analysis", "central service type", None, &["core".to_string()])
        .unwrap();
    engine
        .store_memory(1, "analysis", "revised: entry point for account flows", None, &[])
        .unwrap();

    let memories = engine.get_memories(1).unwrap();
    assert_eq!(memories.len(), 1, "same (node, type) must upsert");
    assert!(memories[0].content.contains("revised"));

    let found = engine.search_memories("account").unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_file_annotations_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let writer = engine.begin_run().unwrap();
    writer
        .insert_file_annotations(
            &[crate::DetectedPattern {
                pattern: "singleton".into(),
                confidence: 0.7,
                description: "single shared instance accessor".into(),
                file_path: "/p/a.py".into(),
                nodes: vec!["Config".into()],
            }],
            &[crate::DetectedLibrary {
                name: "flask".into(),
                category: "web_framework".into(),
                import_statement: "import flask".into(),
                file_path: "/p/a.py".into(),
            }],
            &[crate::DetectedInfra {
                kind: "database".into(),
                name: "sql".into(),
                confidence: 0.7,
                file_path: "/p/a.py".into(),
            }],
        )
        .unwrap();
    writer.commit().unwrap();

    let conn = engine.pool().acquire().unwrap();
    let patterns: i64 = conn.query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get(0)).unwrap();
    let libraries: i64 =
        conn.query_row("SELECT COUNT(*) FROM libraries", [], |r| r.get(0)).unwrap();
    let infra: i64 =
        conn.query_row("SELECT COUNT(*) FROM infrastructure", [], |r| r.get(0)).unwrap();
    assert_eq!((patterns, libraries, infra), (1, 1, 1));
}
