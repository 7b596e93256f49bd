//! Persistence contract for the ingestion pipeline.
//!
//! The reconciler and renewal service write through [`HistoryRepository`];
//! the admin API reads the SQLite tables directly through `db::*_repo`.

mod memory;
mod sqlite;

pub use memory::{DailyCounters, InMemoryHistoryRepository};
pub use sqlite::SqliteHistoryRepository;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::DatabaseError;

/// Outcome recorded for a single processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Processed,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Processed => "processed",
            EventStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that matched and was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEmail {
    pub message_id: String,
    pub history_id: u64,
    pub label_ids: Vec<String>,
    pub snippet: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record of one item's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub message_id: String,
    pub filter_id: Option<String>,
    pub status: EventStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn processed(message_id: &str, at: DateTime<Utc>) -> Self {
        Self::new(message_id, EventStatus::Processed, None, at)
    }

    pub fn error(message_id: &str, error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(message_id, EventStatus::Error, Some(error.into()), at)
    }

    fn new(message_id: &str, status: EventStatus, error: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            filter_id: None,
            status,
            error,
            created_at: at,
        }
    }
}

/// Counter increments produced by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub received: u64,
    pub processed_ok: u64,
    pub processed_error: u64,
}

impl StatsDelta {
    pub fn is_empty(&self) -> bool {
        self.received == 0 && self.processed_ok == 0 && self.processed_error == 0
    }
}

/// A renewal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchStatus {
    pub history_id: u64,
    pub expiration: i64,
    pub created_at: DateTime<Utc>,
}

/// Storage used by the reconciliation pass and watch renewal.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn save_watch_status(&self, status: &WatchStatus) -> Result<(), DatabaseError>;

    /// The most recent renewal by `created_at`.
    async fn latest_watch_status(&self) -> Result<Option<WatchStatus>, DatabaseError>;

    /// Fails with [`DatabaseError::Conflict`] when `message_id` was already
    /// saved; the stored row is left as it was.
    async fn save_processed_email(&self, email: &ProcessedEmail) -> Result<(), DatabaseError>;

    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError>;

    /// Adds `delta` to the UTC day of `at`, creating the row if needed.
    async fn update_daily_stats(&self, delta: StatsDelta, at: DateTime<Utc>) -> Result<(), DatabaseError>;
}

/// `YYYY-MM-DD` in UTC.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// RFC 3339 with millisecond precision, lexicographically sortable.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_key_is_utc() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(day_key(at), "2026-03-09");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 8, 5, 0).unwrap();
        assert_eq!(timestamp(at), "2026-03-09T08:05:00.000Z");
    }

    #[test]
    fn test_event_constructors() {
        let at = Utc::now();
        let ok = Event::processed("m1", at);
        assert_eq!(ok.status, EventStatus::Processed);
        assert!(ok.error.is_none());
        assert!(ok.filter_id.is_none());

        let err = Event::error("m1", "boom", at);
        assert_eq!(err.status.as_str(), "error");
        assert_eq!(err.error.as_deref(), Some("boom"));
        assert_ne!(ok.id, err.id);
    }
}
