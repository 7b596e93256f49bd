use thiserror::Error;

use crate::auth::AuthError;
use crate::db::DatabaseError;
use crate::ingest::{PushError, ReconcileError, RenewError};
use crate::provider::ProviderError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum MailhookError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Renewal error: {0}")]
    Renew(#[from] RenewError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {name}")]
    Missing { name: &'static str },

    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, MailhookError>;
