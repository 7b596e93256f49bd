use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{day_key, timestamp, Event, HistoryRepository, ProcessedEmail, StatsDelta, WatchStatus};
use crate::db::email_repo::{self, ProcessedEmailRow};
use crate::db::event_repo::{self, EventRow};
use crate::db::watch_repo::{self, WatchStatusRow};
use crate::db::{stats_repo, Database, DatabaseError};

/// [`HistoryRepository`] backed by the SQLite tables.
#[derive(Clone)]
pub struct SqliteHistoryRepository {
    db: Database,
}

impl SqliteHistoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn save_watch_status(&self, status: &WatchStatus) -> Result<(), DatabaseError> {
        let row = WatchStatusRow {
            history_id: status.history_id,
            expiration: status.expiration,
            created_at: timestamp(status.created_at),
        };
        self.db.run_blocking(move |db| watch_repo::insert(db, &row)).await
    }

    async fn latest_watch_status(&self) -> Result<Option<WatchStatus>, DatabaseError> {
        let Some(row) = self.db.run_blocking(watch_repo::latest).await? else {
            return Ok(None);
        };
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DatabaseError::Corrupt {
                column: "watch_history.created_at",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Some(WatchStatus {
            history_id: row.history_id,
            expiration: row.expiration,
            created_at,
        }))
    }

    async fn save_processed_email(&self, email: &ProcessedEmail) -> Result<(), DatabaseError> {
        let row = ProcessedEmailRow {
            message_id: email.message_id.clone(),
            history_id: email.history_id,
            label_ids: email.label_ids.clone(),
            snippet: email.snippet.clone(),
            created_at: timestamp(email.created_at),
        };
        self.db.run_blocking(move |db| email_repo::insert(db, &row)).await
    }

    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError> {
        let row = EventRow {
            id: event.id.clone(),
            message_id: event.message_id.clone(),
            filter_id: event.filter_id.clone(),
            status: event.status.as_str().to_string(),
            error: event.error.clone(),
            created_at: timestamp(event.created_at),
        };
        self.db.run_blocking(move |db| event_repo::insert(db, &row)).await
    }

    async fn update_daily_stats(&self, delta: StatsDelta, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let day = day_key(at);
        let event_at = timestamp(at);
        self.db
            .run_blocking(move |db| {
                stats_repo::increment(
                    db,
                    &day,
                    delta.received,
                    delta.processed_ok,
                    delta.processed_error,
                    &event_at,
                )
            })
            .await
    }
}
