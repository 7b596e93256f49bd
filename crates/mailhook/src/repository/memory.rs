use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{day_key, Event, HistoryRepository, ProcessedEmail, StatsDelta, WatchStatus};
use crate::db::DatabaseError;

/// Daily counters as kept by [`InMemoryHistoryRepository`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyCounters {
    pub received: u64,
    pub processed_ok: u64,
    pub processed_error: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    emails: HashMap<String, ProcessedEmail>,
    events: Vec<Event>,
    stats: BTreeMap<String, DailyCounters>,
    watches: Vec<WatchStatus>,
}

/// Mutex-guarded in-process store with the same uniqueness rules as the
/// SQLite tables.
#[derive(Default)]
pub struct InMemoryHistoryRepository {
    state: Mutex<State>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, DatabaseError> {
        let mut state = self.state.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        Ok(f(&mut state))
    }

    pub fn processed_email(&self, message_id: &str) -> Option<ProcessedEmail> {
        self.with_state(|s| s.emails.get(message_id).cloned()).ok().flatten()
    }

    pub fn processed_count(&self) -> usize {
        self.with_state(|s| s.emails.len()).unwrap_or_default()
    }

    /// Events in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.with_state(|s| s.events.clone()).unwrap_or_default()
    }

    pub fn daily_counters(&self, day: &str) -> Option<DailyCounters> {
        self.with_state(|s| s.stats.get(day).copied()).ok().flatten()
    }

    /// Number of distinct days with counters.
    pub fn stats_days(&self) -> usize {
        self.with_state(|s| s.stats.len()).unwrap_or_default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn save_watch_status(&self, status: &WatchStatus) -> Result<(), DatabaseError> {
        self.with_state(|s| s.watches.push(*status))
    }

    async fn latest_watch_status(&self) -> Result<Option<WatchStatus>, DatabaseError> {
        // Later inserts win ties, matching the SQLite ordering.
        self.with_state(|s| {
            s.watches
                .iter()
                .enumerate()
                .max_by_key(|(i, w)| (w.created_at, *i))
                .map(|(_, w)| *w)
        })
    }

    async fn save_processed_email(&self, email: &ProcessedEmail) -> Result<(), DatabaseError> {
        self.with_state(|s| {
            if s.emails.contains_key(&email.message_id) {
                return Err(DatabaseError::Conflict {
                    entity: "processed email",
                    key: email.message_id.clone(),
                });
            }
            s.emails.insert(email.message_id.clone(), email.clone());
            Ok(())
        })?
    }

    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError> {
        self.with_state(|s| s.events.push(event.clone()))
    }

    async fn update_daily_stats(&self, delta: StatsDelta, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.with_state(|s| {
            let counters = s.stats.entry(day_key(at)).or_default();
            counters.received += delta.received;
            counters.processed_ok += delta.processed_ok;
            counters.processed_error += delta.processed_error;
            counters.last_event_at = Some(at);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_conflict_keeps_first_row() {
        let repo = InMemoryHistoryRepository::new();
        let mut email = ProcessedEmail {
            message_id: "m1".to_string(),
            history_id: 1,
            label_ids: vec![],
            snippet: "first".to_string(),
            created_at: Utc::now(),
        };
        repo.save_processed_email(&email).await.unwrap();
        email.snippet = "second".to_string();

        assert!(repo.save_processed_email(&email).await.unwrap_err().is_conflict());
        assert_eq!(repo.processed_count(), 1);
        assert_eq!(repo.processed_email("m1").unwrap().snippet, "first");
    }

    #[tokio::test]
    async fn test_stats_accumulate_per_day() {
        let repo = InMemoryHistoryRepository::new();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 1).unwrap();
        let delta = StatsDelta {
            received: 2,
            processed_ok: 1,
            processed_error: 1,
        };

        repo.update_daily_stats(delta, day1).await.unwrap();
        repo.update_daily_stats(delta, day1).await.unwrap();
        repo.update_daily_stats(delta, day2).await.unwrap();

        let counters = repo.daily_counters("2026-01-01").unwrap();
        assert_eq!(counters.received, 4);
        assert_eq!(counters.processed_ok, 2);
        assert_eq!(repo.stats_days(), 2);
    }

    #[tokio::test]
    async fn test_latest_watch_status() {
        let repo = InMemoryHistoryRepository::new();
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for history_id in [5, 6] {
            repo.save_watch_status(&WatchStatus {
                history_id,
                expiration: 0,
                created_at: at,
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.latest_watch_status().await.unwrap().unwrap().history_id, 6);
    }
}
