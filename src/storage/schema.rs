//! Schema DDL, one constant per migration step. The lineage mirrors how the
//! database evolved: base graph tables, then detector tables, then annotation
//! stores, then the project-local file cache and the FTS5 mirror.

/// 1.0.0: base graph schema.
pub const V1_0_0_UP: &str = "
CREATE TABLE IF NOT EXISTS code_nodes (
    id               INTEGER PRIMARY KEY,
    node_type        TEXT NOT NULL,
    name             TEXT NOT NULL,
    path             TEXT NOT NULL,
    language         TEXT,
    line_number      INTEGER,
    column_number    INTEGER,
    summary          TEXT,
    importance_score REAL NOT NULL DEFAULT 0.0,
    relevance_tags   TEXT,
    created_at       INTEGER NOT NULL,
    UNIQUE (node_type, name, path)
);

CREATE TABLE IF NOT EXISTS relationships (
    source_id         INTEGER NOT NULL REFERENCES code_nodes(id) ON DELETE CASCADE,
    target_id         INTEGER NOT NULL REFERENCES code_nodes(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    weight            REAL NOT NULL DEFAULT 1.0,
    created_at        INTEGER NOT NULL,
    PRIMARY KEY (source_id, target_id, relationship_type)
);

CREATE TABLE IF NOT EXISTS indexing_metadata (
    key        TEXT PRIMARY KEY,
    value      TEXT,
    updated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_code_nodes_path ON code_nodes(path);
CREATE INDEX IF NOT EXISTS idx_code_nodes_importance ON code_nodes(importance_score DESC);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
";

pub const V1_0_0_DOWN: &str = "
DROP INDEX IF EXISTS idx_relationships_target;
DROP INDEX IF EXISTS idx_code_nodes_importance;
DROP INDEX IF EXISTS idx_code_nodes_path;
DROP TABLE IF EXISTS indexing_metadata;
DROP TABLE IF EXISTS relationships;
DROP TABLE IF EXISTS code_nodes;
";

/// 1.1.0: node weight columns plus detector tables.
pub const V1_1_0_UP: &str = "
ALTER TABLE code_nodes ADD COLUMN weight REAL NOT NULL DEFAULT 1.0;
ALTER TABLE code_nodes ADD COLUMN frequency_score REAL NOT NULL DEFAULT 0.0;
ALTER TABLE code_nodes ADD COLUMN usage_stats TEXT;

CREATE TABLE IF NOT EXISTS patterns (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path    TEXT NOT NULL,
    pattern_type TEXT NOT NULL,
    confidence   REAL NOT NULL DEFAULT 0.0,
    description  TEXT,
    nodes        TEXT,
    created_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS libraries (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path        TEXT NOT NULL,
    name             TEXT NOT NULL,
    category         TEXT,
    import_statement TEXT,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS infrastructure (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path  TEXT NOT NULL,
    infra_type TEXT NOT NULL,
    name       TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_file ON patterns(file_path);
CREATE INDEX IF NOT EXISTS idx_libraries_file ON libraries(file_path);
CREATE INDEX IF NOT EXISTS idx_infrastructure_file ON infrastructure(file_path);
";

/// Reverting 1.1.0 rebuilds code_nodes without the added columns.
pub const V1_1_0_DOWN: &str = "
DROP TABLE IF EXISTS infrastructure;
DROP TABLE IF EXISTS libraries;
DROP TABLE IF EXISTS patterns;

CREATE TABLE code_nodes_old AS
    SELECT id, node_type, name, path, language, line_number, column_number,
           summary, importance_score, relevance_tags, created_at
    FROM code_nodes;
DROP TABLE code_nodes;
ALTER TABLE code_nodes_old RENAME TO code_nodes;
";

/// 1.6.0: enhanced metadata and evolution tracking.
pub const V1_6_0_UP: &str = "
CREATE TABLE IF NOT EXISTS enhanced_metadata (
    node_id         INTEGER PRIMARY KEY REFERENCES code_nodes(id) ON DELETE CASCADE,
    llm_summary     TEXT,
    role_tags       TEXT,
    complexity_score REAL,
    quality_metrics TEXT,
    updated_at      INTEGER
);

CREATE TABLE IF NOT EXISTS detected_patterns (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path    TEXT NOT NULL,
    pattern_type TEXT NOT NULL,
    confidence   REAL NOT NULL DEFAULT 0.0,
    description  TEXT,
    nodes        TEXT,
    created_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS code_evolution (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path   TEXT NOT NULL,
    change_type TEXT NOT NULL,
    details     TEXT,
    detected_at INTEGER NOT NULL
);
";

pub const V1_6_0_DOWN: &str = "
DROP TABLE IF EXISTS code_evolution;
DROP TABLE IF EXISTS detected_patterns;
DROP TABLE IF EXISTS enhanced_metadata;
";

/// 1.14.0: opaque annotation store for external hosts.
pub const V1_14_0_UP: &str = "
CREATE TABLE IF NOT EXISTS llm_memories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id     INTEGER NOT NULL,
    memory_type TEXT NOT NULL,
    content     TEXT NOT NULL,
    metadata    TEXT,
    tags        TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    UNIQUE (node_id, memory_type)
);

CREATE INDEX IF NOT EXISTS idx_llm_memories_node ON llm_memories(node_id);
";

pub const V1_14_0_DOWN: &str = "
DROP INDEX IF EXISTS idx_llm_memories_node;
DROP TABLE IF EXISTS llm_memories;
";

/// 1.15.0: project-local file cache and the FTS5 mirror of code_nodes,
/// kept in sync by triggers and backfilled from existing rows.
pub const V1_15_0_UP: &str = "
CREATE TABLE IF NOT EXISTS file_cache (
    file_path     TEXT PRIMARY KEY,
    content_hash  TEXT NOT NULL,
    last_modified INTEGER NOT NULL,
    payload       TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    access_count  INTEGER NOT NULL DEFAULT 0,
    last_accessed INTEGER NOT NULL
);

CREATE VIRTUAL TABLE code_nodes_fts USING fts5(
    name, path, summary, node_type,
    content='code_nodes',
    content_rowid='id'
);

CREATE TRIGGER code_nodes_fts_ai AFTER INSERT ON code_nodes BEGIN
    INSERT INTO code_nodes_fts(rowid, name, path, summary, node_type)
    VALUES (new.id, new.name, new.path, new.summary, new.node_type);
END;

CREATE TRIGGER code_nodes_fts_ad AFTER DELETE ON code_nodes BEGIN
    INSERT INTO code_nodes_fts(code_nodes_fts, rowid, name, path, summary, node_type)
    VALUES ('delete', old.id, old.name, old.path, old.summary, old.node_type);
END;

CREATE TRIGGER code_nodes_fts_au AFTER UPDATE ON code_nodes BEGIN
    INSERT INTO code_nodes_fts(code_nodes_fts, rowid, name, path, summary, node_type)
    VALUES ('delete', old.id, old.name, old.path, old.summary, old.node_type);
    INSERT INTO code_nodes_fts(rowid, name, path, summary, node_type)
    VALUES (new.id, new.name, new.path, new.summary, new.node_type);
END;

INSERT INTO code_nodes_fts(rowid, name, path, summary, node_type)
    SELECT id, name, path, summary, node_type FROM code_nodes;
";

pub const V1_15_0_DOWN: &str = "
DROP TRIGGER IF EXISTS code_nodes_fts_au;
DROP TRIGGER IF EXISTS code_nodes_fts_ad;
DROP TRIGGER IF EXISTS code_nodes_fts_ai;
DROP TABLE IF EXISTS code_nodes_fts;
DROP TABLE IF EXISTS file_cache;
";
