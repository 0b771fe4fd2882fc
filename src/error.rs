//! Unified error type for the indexing engine.
//!
//! One algebraic error end-to-end: soft errors (file read, parse, cache)
//! accumulate in the run summary, fatal errors abort the current command.
//! The library never exits the process; the CLI shim maps variants to exit
//! codes (1 = user error, 2 = fatal internal error).

use thiserror::Error;

/// All errors that can occur in indexing and query operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Path is empty, contains null bytes, is too long, or escapes the
    /// required base directory. User error.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A supplied glob pattern violates the safety caps. User error.
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Mutually exclusive flags or other argument validation error.
    #[error("{0}")]
    InvalidArgs(String),

    /// Could not read a file's bytes. Soft; recorded in per-run errors.
    #[error("Failed to read {path}: {message}")]
    FileRead { path: String, message: String },

    /// A parser failed on file content. Soft; recorded in per-run errors.
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Disk or memory cache I/O or corruption. Logged; treated as a miss.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A schema migration failed and the pre-migration backup was restored.
    /// Fatal; the engine refuses to open the database.
    #[error("Migration to schema {version} failed: {message}")]
    MigrationFailed { version: String, message: String },

    /// Database error. Fatal for the current run; the transaction is rolled back.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Could not acquire a pooled connection in time, even after retries.
    #[error("Timed out acquiring a database connection")]
    PoolTimeout,

    /// The caller requested cancellation. Clean exit with summary.canceled=true.
    #[error("Operation canceled")]
    Canceled,

    /// I/O error outside file reads (directory creation, backups, registry).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of persisted state failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// Soft errors are recorded in the run summary without aborting the run.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            IndexError::FileRead { .. } | IndexError::Parse { .. } | IndexError::Cache(_)
        )
    }

    /// Exit code for the CLI shim: 0 for clean cancel, 1 for user errors,
    /// 2 for fatal internal errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            IndexError::Canceled => 0,
            IndexError::InvalidPath { .. }
            | IndexError::InvalidPattern { .. }
            | IndexError::InvalidArgs(_) => 1,
            _ => 2,
        }
    }

    /// One-line hint printed after a fatal cause.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            IndexError::MigrationFailed { .. } => {
                Some("a pre-migration backup was restored; re-run with --verbose for details")
            }
            IndexError::Storage(_) | IndexError::PoolTimeout => {
                Some("run with --verbose for details")
            }
            _ => None,
        }
    }
}
