//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, which also makes
//! every single-statement upsert atomic with respect to concurrent passes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod email_repo;
pub mod error;
pub mod event_repo;
pub mod filter_repo;
pub mod migrations;
pub mod stats_repo;
pub mod watch_repo;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). The handle is created once at startup,
/// passed explicitly to every component that needs it, and released with
/// [`Database::close`] at shutdown.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` on the blocking thread pool with a clone of this handle.
    ///
    /// Async callers use this so that lock waits and SQLite I/O never stall
    /// the runtime's worker threads.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Closes the connection. Fails if other clones of the handle are alive.
    pub fn close(self) -> Result<(), DatabaseError> {
        let mutex = Arc::try_unwrap(self.conn)
            .map_err(|shared| DatabaseError::StillShared(Arc::strong_count(&shared) - 1))?;
        let conn = mutex.into_inner().map_err(|_| DatabaseError::LockPoisoned)?;
        conn.close().map_err(|(_, e)| DatabaseError::Sqlite(e))?;
        log::info!("Database closed");
        Ok(())
    }
}

/// Returns the canonical database path: `~/.mailhook/data/mailhook.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailhook").join("data").join("mailhook.db"))
}
