//! Daily statistics repository: aggregate counters in `stats_daily`.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Adds the given deltas to the counters for `day`.
///
/// A single UPSERT statement: the row is created on first use and
/// incremented in place afterwards, so concurrent callers never lose
/// updates. `excluded.*` refers to the values of the attempted insert.
pub fn increment(
    db: &Database,
    day: &str,
    received: u64,
    processed_ok: u64,
    processed_error: u64,
    event_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO stats_daily (day, received, processed_ok, processed_error, last_event_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(day) DO UPDATE SET
               received = stats_daily.received + excluded.received,
               processed_ok = stats_daily.processed_ok + excluded.processed_ok,
               processed_error = stats_daily.processed_error + excluded.processed_error,
               last_event_at = excluded.last_event_at",
            params![
                day,
                received as i64,
                processed_ok as i64,
                processed_error as i64,
                event_at,
            ],
        )?;
        Ok(())
    })
}

/// A single day of counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStatRow {
    pub day: String,
    pub received: i64,
    pub processed_ok: i64,
    pub processed_error: i64,
    pub last_event_at: String,
}

/// Returns the rows for `from..=to` (`YYYY-MM-DD`), newest day first.
pub fn query_range(db: &Database, from: &str, to: &str) -> Result<Vec<DailyStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT day, received, processed_ok, processed_error, last_event_at
             FROM stats_daily WHERE day >= ?1 AND day <= ?2 ORDER BY day DESC",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok(DailyStatRow {
                    day: row.get(0)?,
                    received: row.get(1)?,
                    processed_ok: row.get(2)?,
                    processed_error: row.get(3)?,
                    last_event_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
