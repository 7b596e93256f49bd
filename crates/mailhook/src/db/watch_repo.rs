//! Watch history repository: one row per subscription renewal.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A renewal outcome. The newest row by `created_at` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchStatusRow {
    pub history_id: u64,
    pub expiration: i64,
    pub created_at: String,
}

/// Appends a renewal outcome.
pub fn insert(db: &Database, row: &WatchStatusRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO watch_history (history_id, expiration, created_at) VALUES (?1, ?2, ?3)",
            params![row.history_id as i64, row.expiration, row.created_at],
        )?;
        Ok(())
    })
}

/// Returns the most recent renewal outcome, if any.
pub fn latest(db: &Database) -> Result<Option<WatchStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT history_id, expiration, created_at FROM watch_history
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(WatchStatusRow {
                        history_id: row.get::<_, i64>(0)? as u64,
                        expiration: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}
