//! Filter repository: admin-managed match rules in the `filters` table.
//!
//! Filters are listed by ascending priority (lower value = higher precedence).
//! The reconciler does not consult them; they are maintained through the
//! admin API only.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

const DEFAULT_PRIORITY: i64 = 100;

/// A stored filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterRow {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: i64,
    pub gmail_query: String,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by: Option<String>,
}

/// Fields accepted when creating a filter.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFilter {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub gmail_query: String,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

/// Fields accepted when updating a filter. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterPatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i64>,
    pub gmail_query: Option<String>,
}

/// Lists all filters by ascending priority, then name.
pub fn list(db: &Database) -> Result<Vec<FilterRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, enabled, priority, gmail_query, created_at, updated_at, updated_by
             FROM filters ORDER BY priority ASC, name ASC",
        )?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a filter by ID.
pub fn find(db: &Database, id: &str) -> Result<Option<FilterRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Creates a filter with a fresh ID.
pub fn create(
    db: &Database,
    input: &NewFilter,
    updated_by: Option<&str>,
    now: &str,
) -> Result<FilterRow, DatabaseError> {
    let row = FilterRow {
        id: uuid::Uuid::new_v4().to_string(),
        name: input.name.clone(),
        enabled: input.enabled,
        priority: input.priority,
        gmail_query: input.gmail_query.clone(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
        updated_by: updated_by.map(str::to_string),
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO filters (id, name, enabled, priority, gmail_query, created_at, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.name,
                row.enabled,
                row.priority,
                row.gmail_query,
                row.created_at,
                row.updated_at,
                row.updated_by,
            ],
        )?;
        Ok(())
    })?;

    Ok(row)
}

/// Applies a patch. Returns `None` when no filter has the given ID.
pub fn update(
    db: &Database,
    id: &str,
    patch: &FilterPatch,
    updated_by: Option<&str>,
    now: &str,
) -> Result<Option<FilterRow>, DatabaseError> {
    db.with_conn(|conn| {
        let Some(mut row) = find_in(conn, id)? else {
            return Ok(None);
        };

        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        if let Some(enabled) = patch.enabled {
            row.enabled = enabled;
        }
        if let Some(priority) = patch.priority {
            row.priority = priority;
        }
        if let Some(query) = &patch.gmail_query {
            row.gmail_query = query.clone();
        }
        row.updated_at = now.to_string();
        row.updated_by = updated_by.map(str::to_string);

        conn.execute(
            "UPDATE filters SET name = ?1, enabled = ?2, priority = ?3, gmail_query = ?4,
             updated_at = ?5, updated_by = ?6 WHERE id = ?7",
            params![
                row.name,
                row.enabled,
                row.priority,
                row.gmail_query,
                row.updated_at,
                row.updated_by,
                row.id,
            ],
        )?;
        Ok(Some(row))
    })
}

/// Deletes a filter. Returns whether a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute("DELETE FROM filters WHERE id = ?1", params![id])?;
        Ok(count > 0)
    })
}

fn find_in(conn: &Connection, id: &str) -> Result<Option<FilterRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, enabled, priority, gmail_query, created_at, updated_at, updated_by
             FROM filters WHERE id = ?1",
            params![id],
            map_row,
        )
        .optional()?;
    Ok(row)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FilterRow> {
    Ok(FilterRow {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get(2)?,
        priority: row.get(3)?,
        gmail_query: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        updated_by: row.get(7)?,
    })
}
