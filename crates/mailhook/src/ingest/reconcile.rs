//! Reconciliation pass: list changes since a cursor, fetch and evaluate each
//! item, persist matches and record outcomes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::filter;
use crate::provider::{Cursor, MailProvider, ProviderError};
use crate::repository::{Event, HistoryRepository, ProcessedEmail, StatsDelta};

pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to list history: {0}")]
    List(#[source] ProviderError),

    #[error("Reconciliation pass exceeded {0:?}")]
    Timeout(Duration),
}

/// Counts from one pass. `skipped` items did not match the target label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub listed: u64,
    pub processed_ok: u64,
    pub processed_error: u64,
    pub skipped: u64,
}

/// Runs reconciliation passes against a provider and repository.
///
/// Each call is an independent pass; overlapping passes rely on the
/// repository's unique `message_id` rather than on locking.
#[derive(Clone)]
pub struct Reconciler {
    provider: Arc<dyn MailProvider>,
    repo: Arc<dyn HistoryRepository>,
    target_label: Option<String>,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        repo: Arc<dyn HistoryRepository>,
        target_label: Option<String>,
    ) -> Self {
        Self {
            provider,
            repo,
            target_label: target_label.filter(|l| !l.is_empty()),
            timeout: DEFAULT_PASS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target_label(&self) -> Option<&str> {
        self.target_label.as_deref()
    }

    /// Runs one pass under the configured timeout.
    ///
    /// The deadline bounds provider calls and is checked before each item.
    /// Repository writes already started run to completion, and the daily
    /// stats for every outcome seen so far are written before a timeout is
    /// reported.
    pub async fn reconcile(&self, cursor: Cursor) -> Result<PassSummary, ReconcileError> {
        let deadline = Instant::now() + self.timeout;
        let span = info_span!("reconcile", cursor);
        self.pass(cursor, Some(deadline)).instrument(span).await
    }

    /// Runs one pass without a deadline.
    pub async fn run_pass(&self, cursor: Cursor) -> Result<PassSummary, ReconcileError> {
        self.pass(cursor, None).await
    }

    async fn pass(
        &self,
        cursor: Cursor,
        deadline: Option<Instant>,
    ) -> Result<PassSummary, ReconcileError> {
        let mut summary = PassSummary::default();
        if cursor == 0 {
            debug!("Cursor is zero, nothing to reconcile");
            return Ok(summary);
        }

        let items = match within(deadline, self.provider.list_changed(cursor)).await {
            Some(listed) => listed.map_err(ReconcileError::List)?,
            None => return Err(self.timed_out(cursor)),
        };
        summary.listed = items.len() as u64;
        info!("Reconciling {} change(s) since history {}", items.len(), cursor);

        let mut timed_out = false;
        for item in &items {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }

            let fetched = match within(deadline, self.provider.fetch_message(&item.message_id)).await {
                Some(fetched) => fetched,
                None => {
                    timed_out = true;
                    break;
                }
            };
            let message = match fetched {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failed to fetch message {}: {}", item.message_id, e);
                    self.record(Event::error(&item.message_id, e.to_string(), Utc::now()))
                        .await;
                    summary.processed_error += 1;
                    continue;
                }
            };

            if !filter::matches(&message, self.target_label()) {
                debug!("Message {} does not carry the target label", message.id);
                summary.skipped += 1;
                continue;
            }

            let now = Utc::now();
            let email = ProcessedEmail {
                message_id: message.id.clone(),
                history_id: message.history_id,
                label_ids: message.label_ids,
                snippet: message.snippet,
                created_at: now,
            };

            match self.repo.save_processed_email(&email).await {
                Ok(()) => {
                    debug!("Saved message {}", email.message_id);
                    self.record(Event::processed(&item.message_id, now)).await;
                    summary.processed_ok += 1;
                }
                Err(e) => {
                    warn!("Failed to save message {}: {}", email.message_id, e);
                    self.record(Event::error(&item.message_id, e.to_string(), now))
                        .await;
                    summary.processed_error += 1;
                }
            }
        }

        let delta = StatsDelta {
            received: summary.listed,
            processed_ok: summary.processed_ok,
            processed_error: summary.processed_error,
        };
        if !delta.is_empty() {
            if let Err(e) = self.repo.update_daily_stats(delta, Utc::now()).await {
                error!("Failed to update daily stats: {}", e);
            }
        }

        if timed_out {
            warn!(
                "Pass stopped early: listed={} ok={} error={} skipped={}",
                summary.listed, summary.processed_ok, summary.processed_error, summary.skipped
            );
            return Err(self.timed_out(cursor));
        }

        info!(
            "Pass complete: listed={} ok={} error={} skipped={}",
            summary.listed, summary.processed_ok, summary.processed_error, summary.skipped
        );
        Ok(summary)
    }

    fn timed_out(&self, cursor: Cursor) -> ReconcileError {
        error!("Reconciliation from cursor {} timed out after {:?}", cursor, self.timeout);
        ReconcileError::Timeout(self.timeout)
    }

    async fn record(&self, event: Event) {
        if let Err(e) = self.repo.record_event(&event).await {
            error!(
                "Failed to record {} event for {}: {}",
                event.status, event.message_id, e
            );
        }
    }
}

/// Awaits `fut`, or returns `None` once `deadline` passes.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
