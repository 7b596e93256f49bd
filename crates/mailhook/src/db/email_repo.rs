//! Processed email repository: operations on the `processed_emails` table.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A processed email row. `message_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEmailRow {
    pub message_id: String,
    pub history_id: u64,
    pub label_ids: Vec<String>,
    pub snippet: String,
    pub created_at: String,
}

/// Inserts a processed email record.
///
/// A second insert for the same `message_id` fails with
/// [`DatabaseError::Conflict`] and leaves the existing row untouched.
pub fn insert(db: &Database, row: &ProcessedEmailRow) -> Result<(), DatabaseError> {
    let label_ids = serde_json::to_string(&row.label_ids).map_err(|e| DatabaseError::Corrupt {
        column: "label_ids",
        reason: e.to_string(),
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processed_emails (message_id, history_id, label_ids, snippet, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.message_id,
                row.history_id as i64,
                label_ids,
                row.snippet,
                row.created_at,
            ],
        )
        .map_err(|e| unique_conflict(e, "processed email", &row.message_id))?;
        Ok(())
    })
}

/// Maps a SQLite unique-constraint violation to [`DatabaseError::Conflict`].
pub(crate) fn unique_conflict(err: rusqlite::Error, entity: &'static str, key: &str) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DatabaseError::Conflict {
                entity,
                key: key.to_string(),
            }
        }
        _ => DatabaseError::Sqlite(err),
    }
}

/// Finds a processed email by message ID.
pub fn find(db: &Database, message_id: &str) -> Result<Option<ProcessedEmailRow>, DatabaseError> {
    let raw = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT message_id, history_id, label_ids, snippet, created_at
                 FROM processed_emails WHERE message_id = ?1",
                params![message_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(row)
    })?;

    let Some((message_id, history_id, label_ids, snippet, created_at)) = raw else {
        return Ok(None);
    };

    let label_ids: Vec<String> =
        serde_json::from_str(&label_ids).map_err(|e| DatabaseError::Corrupt {
            column: "label_ids",
            reason: e.to_string(),
        })?;

    Ok(Some(ProcessedEmailRow {
        message_id,
        history_id: history_id as u64,
        label_ids,
        snippet,
        created_at,
    }))
}

/// Counts all processed emails.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM processed_emails", [], |r| r.get(0))?;
        Ok(count)
    })
}
