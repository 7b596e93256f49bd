//! Mail provider abstraction: history listing, message fetch and push
//! subscription renewal.

mod memory;

pub use memory::InMemoryMailProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;

/// Provider history cursor. Zero means "unknown".
pub type Cursor = u64;

/// Why a message appears in the change history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    MessageAdded,
    LabelAdded,
    LabelRemoved,
}

/// One entry of the flattened change history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedItem {
    pub message_id: String,
    pub kind: ChangeKind,
}

impl ChangedItem {
    pub fn new(message_id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            message_id: message_id.into(),
            kind,
        }
    }
}

/// A fetched message. Only the fields the pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub history_id: u64,
    pub label_ids: Vec<String>,
    pub snippet: String,
}

/// Result of registering push delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub history_id: u64,
    /// Epoch milliseconds.
    pub expiration: i64,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Credential failure: {0}")]
    Auth(#[from] AuthError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Provider returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response for {operation}: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid request URL from base '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// The provider operations the reconciler and renewal service depend on.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists changes since `cursor`, flattened per history record in the
    /// order added, label added, label removed. A zero cursor yields an
    /// empty list without contacting the provider.
    async fn list_changed(&self, cursor: Cursor) -> Result<Vec<ChangedItem>, ProviderError>;

    /// Fetches a single message.
    async fn fetch_message(&self, message_id: &str) -> Result<Message, ProviderError>;

    /// Registers push delivery for the inbox to `topic`.
    async fn watch(&self, topic: &str) -> Result<WatchResponse, ProviderError>;
}
