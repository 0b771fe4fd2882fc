//! Schema migrations: ordered, reversible steps with a pre-applied file
//! backup. On open, the current version is detected (from metadata, or
//! inferred from table shape for legacy databases), pending migrations run
//! one transaction each, and any failure restores the backup and surfaces a
//! fatal `MigrationFailed`.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use super::schema;
use crate::error::IndexError;
use crate::now_secs;

/// How many pre-migration backups to keep.
const BACKUPS_KEPT: usize = 10;

pub struct Migration {
    pub version: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// All migrations, oldest first. The last entry is the current target.
pub const MIGRATIONS: &[Migration] = &[
    Migration { version: "1.0.0", up: schema::V1_0_0_UP, down: schema::V1_0_0_DOWN },
    Migration { version: "1.1.0", up: schema::V1_1_0_UP, down: schema::V1_1_0_DOWN },
    Migration { version: "1.6.0", up: schema::V1_6_0_UP, down: schema::V1_6_0_DOWN },
    Migration { version: "1.14.0", up: schema::V1_14_0_UP, down: schema::V1_14_0_DOWN },
    Migration { version: "1.15.0", up: schema::V1_15_0_UP, down: schema::V1_15_0_DOWN },
];

/// The schema version a fully migrated database carries.
pub fn current_version() -> &'static str {
    MIGRATIONS.last().map(|m| m.version).unwrap_or("0.0.0")
}

/// Parse "1.14.0" into a comparable tuple.
fn parse_version(v: &str) -> (u32, u32, u32) {
    let mut parts = v.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Bring the database at `db_path` to the current schema version.
/// `backups_dir` receives a copy of the file before any migration runs.
pub fn migrate(db_path: &Path, backups_dir: &Path) -> Result<(), IndexError> {
    let existed = db_path.exists();
    let conn = Connection::open(db_path)?;

    let detected = detect_version(&conn)?;
    let pending: Vec<&Migration> = match &detected {
        None => MIGRATIONS.iter().collect(),
        Some(current) => {
            let cur = parse_version(current);
            MIGRATIONS.iter().filter(|m| parse_version(m.version) > cur).collect()
        }
    };

    if pending.is_empty() {
        return Ok(());
    }

    // Back up an existing database before touching it. Fresh files skip this.
    // Checkpoint first so a WAL-mode database is fully contained in the main
    // file we copy.
    let backup = if existed && detected.is_some() {
        let _ = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()));
        Some(create_backup(db_path, backups_dir)?)
    } else {
        None
    };

    ensure_history_table(&conn)?;

    for migration in &pending {
        info!(version = migration.version, "applying schema migration");
        if let Err(e) = apply_one(&conn, migration) {
            warn!(version = migration.version, error = %e, "migration failed, restoring backup");
            drop(conn);
            if let Some(backup_path) = &backup {
                if let Err(restore_err) = std::fs::copy(backup_path, db_path) {
                    warn!(error = %restore_err, "backup restore failed");
                }
                // Stale WAL sidecars would shadow the restored file.
                for suffix in ["-wal", "-shm"] {
                    let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
                    let _ = std::fs::remove_file(sidecar);
                }
            }
            return Err(IndexError::MigrationFailed {
                version: migration.version.to_string(),
                message: e.to_string(),
            });
        }
    }

    prune_backups(db_path, backups_dir);
    Ok(())
}

/// One migration inside one transaction: DDL, history row, version bump.
fn apply_one(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    conn.execute_batch("BEGIN")?;
    let result = (|| {
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT OR REPLACE INTO migration_history (version, applied_at, rollback_hash)
             VALUES (?1, ?2, ?3)",
            params![migration.version, now_secs(), crate::content_hash(migration.down.as_bytes())],
        )?;
        conn.execute(
            "INSERT INTO indexing_metadata (key, value, updated_at) VALUES ('schema_version', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![migration.version, now_secs()],
        )?;
        Ok(())
    })();
    match result {
        Ok(()) => conn.execute_batch("COMMIT"),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn ensure_history_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migration_history (
             version       TEXT PRIMARY KEY,
             applied_at    INTEGER NOT NULL,
             rollback_hash TEXT
         )",
    )
}

/// Read schema_version from metadata, or infer a legacy version from the
/// table shape when the marker is absent.
pub fn detect_version(conn: &Connection) -> Result<Option<String>, IndexError> {
    if table_exists(conn, "indexing_metadata")? {
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM indexing_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(v) = stored {
            return Ok(Some(v));
        }
    }

    if !table_exists(conn, "code_nodes")? {
        return Ok(None);
    }

    // Legacy database without a version marker: infer from shape, newest first.
    debug!("no schema_version marker, inferring legacy version from table shape");
    if table_exists(conn, "code_nodes_fts")? {
        return Ok(Some("1.15.0".to_string()));
    }
    if table_exists(conn, "llm_memories")? {
        return Ok(Some("1.14.0".to_string()));
    }
    if table_exists(conn, "enhanced_metadata")? {
        return Ok(Some("1.6.0".to_string()));
    }
    if column_exists(conn, "code_nodes", "weight")? {
        return Ok(Some("1.1.0".to_string()));
    }
    Ok(Some("1.0.0".to_string()))
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, IndexError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, IndexError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ─── Backups ────────────────────────────────────────────────────────

fn backup_prefix(db_path: &Path) -> String {
    db_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "db".to_string())
}

fn create_backup(db_path: &Path, backups_dir: &Path) -> Result<PathBuf, IndexError> {
    std::fs::create_dir_all(backups_dir)?;
    let backup_path =
        backups_dir.join(format!("{}.{}.backup.db", backup_prefix(db_path), now_secs()));
    std::fs::copy(db_path, &backup_path)?;
    info!(backup = %backup_path.display(), "created pre-migration backup");
    Ok(backup_path)
}

/// Keep the newest `BACKUPS_KEPT` backups for this database, delete the rest.
fn prune_backups(db_path: &Path, backups_dir: &Path) {
    let prefix = backup_prefix(db_path);
    let Ok(entries) = std::fs::read_dir(backups_dir) else { return };

    let dotted = format!("{}.", prefix);
    let mut backups: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name().map(|n| n.to_string_lossy().starts_with(&dotted)).unwrap_or(false)
        })
        .collect();
    backups.sort();
    while backups.len() > BACKUPS_KEPT {
        let oldest = backups.remove(0);
        if std::fs::remove_file(&oldest).is_ok() {
            debug!(backup = %oldest.display(), "pruned old backup");
        }
    }
}
