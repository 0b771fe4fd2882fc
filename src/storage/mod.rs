//! Embedded SQLite storage engine: connection pooling, batched writes inside
//! a single run transaction, schema migrations on open, and the query
//! primitives the surface layers build on.

pub mod migrations;
pub mod schema;

pub use migrations::current_version;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::IndexError;
use crate::{
    CodeNode, DetectedInfra, DetectedLibrary, DetectedPattern, NodeKind, RelKind, Relationship,
    now_secs,
};

/// Connection-open retries before `PoolTimeout`.
const ACQUIRE_RETRIES: u32 = 3;

// ─── Connection pool ────────────────────────────────────────────────

/// Hands out configured connections, one per thread of use; returned
/// connections are parked for reuse. Writers serialize at the SQLite level
/// (WAL, busy timeout); readers run concurrently on their own connections.
#[derive(Debug)]
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    fn new(path: PathBuf) -> Self {
        ConnectionPool { path, idle: Mutex::new(Vec::new()) }
    }

    pub fn acquire(&self) -> Result<PooledConnection<'_>, IndexError> {
        if let Some(conn) = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop() {
            return Ok(PooledConnection { pool: self, conn: Some(conn) });
        }

        let mut attempt = 0;
        loop {
            match Connection::open(&self.path).and_then(|c| {
                configure_connection(&c)?;
                Ok(c)
            }) {
                Ok(conn) => return Ok(PooledConnection { pool: self, conn: Some(conn) }),
                Err(e) if attempt < ACQUIRE_RETRIES => {
                    attempt += 1;
                    debug!(attempt, error = %e, "connection open failed, retrying");
                    std::thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
                Err(_) => return Err(IndexError::PoolTimeout),
            }
        }
    }
}

/// WAL, relaxed sync, 64 MiB page cache, 256 MiB mmap, foreign keys on,
/// 5 s busy timeout.
fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", -65_536)?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    Ok(())
}

pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().unwrap_or_else(|e| e.into_inner()).push(conn);
        }
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct StorageEngine {
    pool: ConnectionPool,
    schema_version: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    pub total_nodes: i64,
    pub total_relationships: i64,
    pub nodes_by_kind: BTreeMap<String, i64>,
    pub relationships_by_kind: BTreeMap<String, i64>,
    pub nodes_by_language: BTreeMap<String, i64>,
    pub last_indexed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmMemory {
    pub node_id: i64,
    pub memory_type: String,
    pub content: String,
    pub metadata: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Incoming and outgoing neighbors of a node.
#[derive(Debug, Clone, Default)]
pub struct Related {
    pub incoming: Vec<(CodeNode, RelKind, f64)>,
    pub outgoing: Vec<(CodeNode, RelKind, f64)>,
}

impl StorageEngine {
    /// Open a project database, running any pending migrations first.
    /// A failed migration restores the pre-migration backup and refuses to open.
    pub fn open(db_path: &Path, backups_dir: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        migrations::migrate(db_path, backups_dir)?;

        let pool = ConnectionPool::new(db_path.to_path_buf());
        let conn = pool.acquire()?;
        let schema_version: String = conn
            .query_row(
                "SELECT value FROM indexing_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_else(|| current_version().to_string());
        drop(conn);

        Ok(StorageEngine { pool, schema_version })
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Begin the single write transaction for an index run.
    pub fn begin_run(&self) -> Result<RunWriter<'_>, IndexError> {
        let conn = self.pool.acquire()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(RunWriter { conn, finished: false })
    }

    // ── Read primitives ─────────────────────────────────────────

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, IndexError> {
        let conn = self.pool.acquire()?;
        let value = conn
            .query_row(
                "SELECT value FROM indexing_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn get_node(&self, id: i64) -> Result<Option<CodeNode>, IndexError> {
        let conn = self.pool.acquire()?;
        let node = conn
            .query_row(
                &format!("SELECT {} FROM code_nodes WHERE id = ?1", NODE_COLUMNS),
                params![id],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    /// Ranked lookup: nodes ordered by importance, optionally filtered.
    pub fn query_important(
        &self,
        limit: usize,
        min_score: Option<f64>,
        kind: Option<NodeKind>,
        path_prefix: Option<&str>,
    ) -> Result<Vec<CodeNode>, IndexError> {
        let mut sql = format!("SELECT {} FROM code_nodes WHERE 1=1", NODE_COLUMNS);
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(score) = min_score {
            sql.push_str(" AND importance_score >= ?");
            args.push(Box::new(score));
        }
        if let Some(kind) = kind {
            sql.push_str(" AND node_type = ?");
            args.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(prefix) = path_prefix {
            sql.push_str(" AND path LIKE ? || '%'");
            args.push(Box::new(prefix.to_string()));
        }
        sql.push_str(" ORDER BY importance_score DESC, id ASC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), row_to_node)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Full-text (or LIKE-fallback) search over name/path/summary.
    /// FTS tokens join with OR for `Any`, AND for `All`; results order by
    /// importance, then FTS rank.
    pub fn search(
        &self,
        terms: &[String],
        mode: SearchMode,
        kind: Option<NodeKind>,
        limit: usize,
        use_fts: bool,
    ) -> Result<Vec<CodeNode>, IndexError> {
        let tokens: Vec<String> = terms
            .iter()
            .flat_map(|t| t.split_whitespace())
            .map(sanitize_token)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        if use_fts && self.fts_available()? {
            match self.search_fts(&tokens, mode, kind, limit) {
                Ok(rows) => return Ok(rows),
                Err(e) => debug!(error = %e, "FTS query failed, falling back to LIKE"),
            }
        }
        self.search_like(&tokens, mode, kind, limit)
    }

    fn fts_available(&self) -> Result<bool, IndexError> {
        let conn = self.pool.acquire()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'code_nodes_fts'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn search_fts(
        &self,
        tokens: &[String],
        mode: SearchMode,
        kind: Option<NodeKind>,
        limit: usize,
    ) -> Result<Vec<CodeNode>, IndexError> {
        let joiner = match mode {
            SearchMode::Any => " OR ",
            SearchMode::All => " AND ",
        };
        let match_expr = tokens
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(joiner);

        let mut sql = format!(
            "SELECT {} FROM code_nodes_fts JOIN code_nodes n ON n.id = code_nodes_fts.rowid
             WHERE code_nodes_fts MATCH ?",
            NODE_COLUMNS_PREFIXED
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_expr)];
        if let Some(kind) = kind {
            sql.push_str(" AND n.node_type = ?");
            args.push(Box::new(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY n.importance_score DESC, code_nodes_fts.rank LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), row_to_node)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn search_like(
        &self,
        tokens: &[String],
        mode: SearchMode,
        kind: Option<NodeKind>,
        limit: usize,
    ) -> Result<Vec<CodeNode>, IndexError> {
        let joiner = match mode {
            SearchMode::Any => " OR ",
            SearchMode::All => " AND ",
        };
        let clauses: Vec<String> = tokens
            .iter()
            .map(|_| "(name LIKE '%' || ? || '%' OR COALESCE(summary, '') LIKE '%' || ? || '%')".to_string())
            .collect();
        let mut sql = format!(
            "SELECT {} FROM code_nodes WHERE ({})",
            NODE_COLUMNS,
            clauses.join(joiner)
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for token in tokens {
            args.push(Box::new(token.clone()));
            args.push(Box::new(token.clone()));
        }
        if let Some(kind) = kind {
            sql.push_str(" AND node_type = ?");
            args.push(Box::new(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY importance_score DESC, id ASC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), row_to_node)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Totals by kind and relationship kind, plus the last index timestamp.
    pub fn stats(&self) -> Result<StorageStats, IndexError> {
        let conn = self.pool.acquire()?;
        let mut stats = StorageStats::default();

        let mut stmt =
            conn.prepare("SELECT node_type, COUNT(*) FROM code_nodes GROUP BY node_type")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.total_nodes += count;
            stats.nodes_by_kind.insert(kind, count);
        }
        drop(rows);
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT relationship_type, COUNT(*) FROM relationships GROUP BY relationship_type",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.total_relationships += count;
            stats.relationships_by_kind.insert(kind, count);
        }
        drop(rows);
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT language, COUNT(*) FROM code_nodes
             WHERE node_type = 'file' AND language IS NOT NULL GROUP BY language",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let language: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.nodes_by_language.insert(language, count);
        }
        drop(rows);
        drop(stmt);

        stats.last_indexed_at = conn
            .query_row(
                "SELECT value FROM indexing_metadata WHERE key = 'last_indexed_at'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok());

        Ok(stats)
    }

    /// Incoming and outgoing neighbors with relationship kinds and weights.
    pub fn find_related(&self, node_id: i64) -> Result<Related, IndexError> {
        let conn = self.pool.acquire()?;
        let mut related = Related::default();

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, r.relationship_type, r.weight
             FROM relationships r JOIN code_nodes n ON n.id = r.source_id
             WHERE r.target_id = ?1 ORDER BY n.id",
            NODE_COLUMNS_PREFIXED
        ))?;
        let mut rows = stmt.query(params![node_id])?;
        while let Some(row) = rows.next()? {
            let node = row_to_node(row)?;
            let kind: String = row.get(14)?;
            let weight: f64 = row.get(15)?;
            if let Ok(kind) = kind.parse::<RelKind>() {
                related.incoming.push((node, kind, weight));
            }
        }
        drop(rows);
        drop(stmt);

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, r.relationship_type, r.weight
             FROM relationships r JOIN code_nodes n ON n.id = r.target_id
             WHERE r.source_id = ?1 ORDER BY n.id",
            NODE_COLUMNS_PREFIXED
        ))?;
        let mut rows = stmt.query(params![node_id])?;
        while let Some(row) = rows.next()? {
            let node = row_to_node(row)?;
            let kind: String = row.get(14)?;
            let weight: f64 = row.get(15)?;
            if let Ok(kind) = kind.parse::<RelKind>() {
                related.outgoing.push((node, kind, weight));
            }
        }

        Ok(related)
    }

    // ── Annotation store (opaque) ───────────────────────────────

    /// Upsert an annotation on `(node_id, memory_type)`.
    pub fn store_memory(
        &self,
        node_id: i64,
        memory_type: &str,
        content: &str,
        metadata: Option<&str>,
        tags: &[String],
    ) -> Result<(), IndexError> {
        let conn = self.pool.acquire()?;
        let now = now_secs();
        conn.execute(
            "INSERT INTO llm_memories (node_id, memory_type, content, metadata, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(node_id, memory_type) DO UPDATE SET
                 content = excluded.content,
                 metadata = excluded.metadata,
                 tags = excluded.tags,
                 updated_at = excluded.updated_at",
            params![node_id, memory_type, content, metadata, serde_json::to_string(tags)?, now],
        )?;
        Ok(())
    }

    pub fn get_memories(&self, node_id: i64) -> Result<Vec<LlmMemory>, IndexError> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, memory_type, content, metadata, tags, created_at, updated_at
             FROM llm_memories WHERE node_id = ?1 ORDER BY memory_type",
        )?;
        let rows = stmt.query_map(params![node_id], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn search_memories(&self, term: &str) -> Result<Vec<LlmMemory>, IndexError> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, memory_type, content, metadata, tags, created_at, updated_at
             FROM llm_memories WHERE content LIKE '%' || ?1 || '%' ORDER BY node_id, memory_type",
        )?;
        let rows = stmt.query_map(params![term], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<LlmMemory> {
    let tags_raw: Option<String> = row.get(4)?;
    let tags = tags_raw
        .and_then(|t| serde_json::from_str::<Vec<String>>(&t).ok())
        .unwrap_or_default();
    Ok(LlmMemory {
        node_id: row.get(0)?,
        memory_type: row.get(1)?,
        content: row.get(2)?,
        metadata: row.get(3)?,
        tags,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ─── Run writer ─────────────────────────────────────────────────────

/// Holds the run's exclusive write transaction. Dropping without `commit`
/// rolls everything back.
pub struct RunWriter<'a> {
    conn: PooledConnection<'a>,
    finished: bool,
}

impl RunWriter<'_> {
    /// Next unused node id, persisted across runs so ids are never reused
    /// within a database lifetime.
    pub fn next_node_id(&self) -> Result<i64, IndexError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM indexing_metadata WHERE key = 'next_node_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(v) = stored {
            if let Ok(id) = v.parse::<i64>() {
                return Ok(id);
            }
        }
        // First run on this database (or legacy metadata): derive from max id.
        let max: Option<i64> =
            self.conn.query_row("SELECT MAX(id) FROM code_nodes", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// All distinct paths currently indexed (for stale-file cleanup).
    pub fn existing_paths(&self) -> Result<Vec<String>, IndexError> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT path FROM code_nodes")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Remove every node whose path equals `path` (relationships cascade),
    /// plus the file-scoped detector records.
    pub fn delete_file_entities(&self, path: &str) -> Result<(), IndexError> {
        self.conn.execute("DELETE FROM code_nodes WHERE path = ?1", params![path])?;
        self.conn.execute("DELETE FROM patterns WHERE file_path = ?1", params![path])?;
        self.conn.execute("DELETE FROM libraries WHERE file_path = ?1", params![path])?;
        self.conn.execute("DELETE FROM infrastructure WHERE file_path = ?1", params![path])?;
        Ok(())
    }

    /// Bulk node insert with one prepared statement, idempotent on id.
    pub fn insert_nodes(&self, nodes: &[CodeNode]) -> Result<(), IndexError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO code_nodes
                 (id, node_type, name, path, language, line_number, column_number, summary,
                  importance_score, relevance_tags, weight, frequency_score, usage_stats, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for node in nodes {
            stmt.execute(params![
                node.id,
                node.kind.as_str(),
                node.name,
                node.path,
                node.language,
                node.line,
                node.column,
                node.summary,
                node.importance_score,
                serde_json::to_string(&node.relevance_tags)?,
                node.weight,
                node.frequency_score,
                node.usage_stats,
                node.created_at,
            ])?;
        }
        Ok(())
    }

    /// Bulk relationship insert, idempotent on (source, target, kind).
    /// Both endpoints must already exist; foreign keys are enforced.
    pub fn insert_relationships(&self, rels: &[Relationship]) -> Result<(), IndexError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO relationships
                 (source_id, target_id, relationship_type, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for rel in rels {
            stmt.execute(params![
                rel.source,
                rel.target,
                rel.kind.as_str(),
                rel.weight,
                rel.created_at,
            ])?;
        }
        Ok(())
    }

    /// Replace the detector records for one file.
    pub fn insert_file_annotations(
        &self,
        patterns: &[DetectedPattern],
        libraries: &[DetectedLibrary],
        infrastructure: &[DetectedInfra],
    ) -> Result<(), IndexError> {
        let now = now_secs();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO patterns (file_path, pattern_type, confidence, description, nodes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for p in patterns {
            stmt.execute(params![
                p.file_path,
                p.pattern,
                p.confidence,
                p.description,
                serde_json::to_string(&p.nodes)?,
                now,
            ])?;
        }

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO libraries (file_path, name, category, import_statement, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for l in libraries {
            stmt.execute(params![l.file_path, l.name, l.category, l.import_statement, now])?;
        }

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO infrastructure (file_path, infra_type, name, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for i in infrastructure {
            stmt.execute(params![i.file_path, i.kind, i.name, i.confidence, now])?;
        }
        Ok(())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO indexing_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_secs()],
        )?;
        Ok(())
    }

    pub fn commit(mut self) -> Result<(), IndexError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), IndexError> {
        self.conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for RunWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

// ─── Row mapping ────────────────────────────────────────────────────

const NODE_COLUMNS: &str = "id, node_type, name, path, language, line_number, column_number, \
                            summary, importance_score, relevance_tags, weight, frequency_score, \
                            usage_stats, created_at";

const NODE_COLUMNS_PREFIXED: &str =
    "n.id, n.node_type, n.name, n.path, n.language, n.line_number, n.column_number, n.summary, \
     n.importance_score, n.relevance_tags, n.weight, n.frequency_score, n.usage_stats, n.created_at";

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeNode> {
    let kind_raw: String = row.get(1)?;
    let kind = kind_raw.parse::<NodeKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    let tags_raw: Option<String> = row.get(9)?;
    let relevance_tags = tags_raw
        .and_then(|t| serde_json::from_str::<Vec<String>>(&t).ok())
        .unwrap_or_default();

    Ok(CodeNode {
        id: row.get(0)?,
        kind,
        name: row.get(2)?,
        path: row.get(3)?,
        language: row.get(4)?,
        line: row.get(5)?,
        column: row.get(6)?,
        summary: row.get(7)?,
        importance_score: row.get(8)?,
        relevance_tags,
        weight: row.get(10)?,
        frequency_score: row.get(11)?,
        usage_stats: row.get(12)?,
        created_at: row.get(13)?,
    })
}

/// Strip everything but word characters from a search token.
fn sanitize_token(token: &str) -> String {
    token.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>().to_lowercase()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
