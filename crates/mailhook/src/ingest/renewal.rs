//! Push subscription renewal.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use crate::provider::{MailProvider, ProviderError, WatchResponse};
use crate::repository::{HistoryRepository, WatchStatus};

/// Topic suffix used when no topic is configured.
pub const DEFAULT_TOPIC_NAME: &str = "gmail-hook-topic";

#[derive(Error, Debug)]
pub enum RenewError {
    #[error("No topic configured and no project id to derive one from")]
    NoTopic,

    #[error("Watch call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Renews the provider watch and records the outcome.
#[derive(Clone)]
pub struct WatchService {
    provider: Arc<dyn MailProvider>,
    repo: Arc<dyn HistoryRepository>,
    project_id: String,
    default_topic: Option<String>,
}

impl WatchService {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        repo: Arc<dyn HistoryRepository>,
        project_id: impl Into<String>,
        default_topic: Option<String>,
    ) -> Self {
        Self {
            provider,
            repo,
            project_id: project_id.into(),
            default_topic: default_topic.filter(|t| !t.is_empty()),
        }
    }

    /// Picks the topic: a non-empty override, then the configured topic,
    /// then `projects/{project_id}/topics/gmail-hook-topic`.
    pub fn resolve_topic(&self, topic_override: Option<&str>) -> Result<String, RenewError> {
        if let Some(topic) = topic_override.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(topic.to_string());
        }
        if let Some(topic) = &self.default_topic {
            return Ok(topic.clone());
        }
        if self.project_id.is_empty() {
            return Err(RenewError::NoTopic);
        }
        Ok(format!(
            "projects/{}/topics/{}",
            self.project_id, DEFAULT_TOPIC_NAME
        ))
    }

    /// Registers the watch. A failure to persist the result is logged and
    /// does not fail the renewal.
    pub async fn renew(&self, topic_override: Option<&str>) -> Result<WatchResponse, RenewError> {
        let topic = self.resolve_topic(topic_override)?;
        info!("Renewing watch for topic {}", topic);

        let response = self.provider.watch(&topic).await.map_err(|e| {
            error!("Watch renewal for {} failed: {}", topic, e);
            RenewError::Provider(e)
        })?;

        let status = WatchStatus {
            history_id: response.history_id,
            expiration: response.expiration,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repo.save_watch_status(&status).await {
            error!("Failed to save watch status: {}", e);
        }

        info!(
            "Watch renewed: historyId={}, expiration={}",
            response.history_id, response.expiration
        );
        Ok(response)
    }
}
