//! Gmail REST implementation of [`MailProvider`].

pub mod api;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Response, StatusCode, Url};
use secrecy::ExposeSecret;

use crate::auth::TokenProvider;
use crate::provider::{ChangeKind, ChangedItem, Cursor, MailProvider, Message, ProviderError, WatchResponse};
use api::{GmailMessage, GmailWatchResponse, HistoryListResponse, WatchRequest};

const HISTORY_TYPES: [&str; 3] = ["messageAdded", "labelAdded", "labelRemoved"];
const WATCH_LABEL: &str = "INBOX";
const MAX_ERROR_BODY_LENGTH: usize = 300;
const DEFAULT_MAX_HISTORY_PAGES: usize = 500;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the authenticated user's mailbox (`users/me`).
pub struct GmailClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    max_history_pages: usize,
}

impl GmailClient {
    /// `base_url` is the API origin, e.g. `https://gmail.googleapis.com`.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            max_history_pages: DEFAULT_MAX_HISTORY_PAGES,
        })
    }

    /// Caps how many `history.list` pages one listing may follow.
    pub fn with_max_history_pages(mut self, max_pages: usize) -> Self {
        self.max_history_pages = max_pages.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me/{}", self.base_url, path)
    }

    /// `messages/{id}` with the id percent-encoded as one path segment.
    fn message_url(&self, message_id: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.url("messages")).map_err(|e| ProviderError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl {
                url: self.base_url.clone(),
                reason: "cannot be a base".to_string(),
            })?
            .push(message_id);
        Ok(url)
    }

    async fn history_page(
        &self,
        cursor: Cursor,
        page_token: Option<&str>,
    ) -> Result<HistoryListResponse, ProviderError> {
        let token = self.tokens.access_token().await?;

        let mut query: Vec<(&str, String)> = vec![("startHistoryId", cursor.to_string())];
        query.extend(HISTORY_TYPES.iter().map(|t| ("historyTypes", t.to_string())));
        if let Some(page) = page_token {
            query.push(("pageToken", page.to_string()));
        }

        let response = self
            .http
            .get(self.url("history"))
            .bearer_auth(token.expose_secret())
            .query(&query)
            .send()
            .await?;
        let response = check_status(response, "history.list", &format!("history {}", cursor)).await?;

        response.json().await.map_err(|e| ProviderError::Decode {
            operation: "history.list",
            reason: e.to_string(),
        })
    }
}

/// Flattens history records in the order added, label added, label removed.
fn flatten_history(page: HistoryListResponse, out: &mut Vec<ChangedItem>) {
    for record in page.history {
        let groups = [
            (record.messages_added, ChangeKind::MessageAdded),
            (record.labels_added, ChangeKind::LabelAdded),
            (record.labels_removed, ChangeKind::LabelRemoved),
        ];
        for (changes, kind) in groups {
            out.extend(
                changes
                    .into_iter()
                    .filter_map(|c| c.message)
                    .map(|m| ChangedItem::new(m.id, kind)),
            );
        }
    }
}

async fn check_status(
    response: Response,
    operation: &'static str,
    resource: &str,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(resource.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let body = match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body,
    };
    Err(ProviderError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_changed(&self, cursor: Cursor) -> Result<Vec<ChangedItem>, ProviderError> {
        if cursor == 0 {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            if pages >= self.max_history_pages {
                return Err(ProviderError::Decode {
                    operation: "history.list",
                    reason: format!("more than {} pages", self.max_history_pages),
                });
            }
            let page = self.history_page(cursor, page_token.as_deref()).await?;
            pages += 1;
            page_token = page.next_page_token.clone().filter(|t| !t.is_empty());
            flatten_history(page, &mut items);

            match &page_token {
                None => break,
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    return Err(ProviderError::Decode {
                        operation: "history.list",
                        reason: format!("page token '{}' repeated", token),
                    });
                }
                Some(_) => {}
            }
        }

        debug!(
            "History since {}: {} change(s) across {} page(s)",
            cursor,
            items.len(),
            pages
        );
        Ok(items)
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, ProviderError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(self.message_url(message_id)?)
            .bearer_auth(token.expose_secret())
            .query(&[("format", "minimal")])
            .send()
            .await?;
        let response =
            check_status(response, "messages.get", &format!("message {}", message_id)).await?;

        let msg: GmailMessage = response.json().await.map_err(|e| ProviderError::Decode {
            operation: "messages.get",
            reason: e.to_string(),
        })?;

        Ok(Message {
            id: msg.id,
            history_id: msg.history_id,
            label_ids: msg.label_ids,
            snippet: msg.snippet,
        })
    }

    async fn watch(&self, topic: &str) -> Result<WatchResponse, ProviderError> {
        let token = self.tokens.access_token().await?;

        let request = WatchRequest {
            topic_name: topic,
            label_ids: vec![WATCH_LABEL],
        };
        let response = self
            .http
            .post(self.url("watch"))
            .bearer_auth(token.expose_secret())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, "watch", &format!("topic {}", topic)).await?;

        let watch: GmailWatchResponse = response.json().await.map_err(|e| ProviderError::Decode {
            operation: "watch",
            reason: e.to_string(),
        })?;

        info!(
            "Watch registered on {} (historyId={}, expiration={})",
            topic, watch.history_id, watch.expiration
        );
        Ok(WatchResponse {
            history_id: watch.history_id,
            expiration: watch.expiration,
        })
    }
}
