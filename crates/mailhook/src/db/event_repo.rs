//! Event repository: append-only audit rows in the `events` table.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// A raw event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRow {
    pub id: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

/// Appends an event.
pub fn insert(db: &Database, row: &EventRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO events (id, message_id, filter_id, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.message_id,
                row.filter_id,
                row.status,
                row.error,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Lists the most recent events, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, message_id, filter_id, status, error, created_at
             FROM events ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(EventRow {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    filter_id: row.get(2)?,
                    status: row.get(3)?,
                    error: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts events with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
