pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod gmail;
pub mod ingest;
pub mod logging;
pub mod provider;
pub mod repository;
pub mod secrets;

pub use auth::{AuthError, OAuthTokenProvider, StaticTokenProvider, TokenProvider};
pub use config::Config;
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, MailhookError, Result};
pub use gmail::GmailClient;
pub use ingest::{PassSummary, PushError, ReconcileError, Reconciler, RenewError, WatchService};
pub use provider::{ChangeKind, ChangedItem, Cursor, MailProvider, Message, ProviderError, WatchResponse};
pub use repository::{HistoryRepository, InMemoryHistoryRepository, SqliteHistoryRepository};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError, SecretSource};
