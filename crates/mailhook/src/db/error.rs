//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the database directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A row with the same unique key already exists.
    #[error("Duplicate {entity}: {key}")]
    Conflict { entity: &'static str, key: String },

    /// A stored value could not be decoded.
    #[error("Corrupt {column} value: {reason}")]
    Corrupt { column: &'static str, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A blocking database task panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Task(String),

    /// The handle is still shared and cannot be closed.
    #[error("Database is still in use by {0} other handle(s)")]
    StillShared(usize),
}

impl DatabaseError {
    /// Returns true when the error is a unique-constraint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict { .. })
    }
}
