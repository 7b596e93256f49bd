//! Access-token providers for the mail provider API.
//!
//! The provider client asks a [`TokenProvider`] for a bearer token before
//! every call. Production uses [`OAuthTokenProvider`], which exchanges a
//! long-lived refresh token; local runs and tests use [`StaticTokenProvider`].

mod oauth;

pub use oauth::OAuthTokenProvider;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::config::Config;
use crate::error::ConfigError;
use crate::secrets::{resolve_secret_optional, SecretSource};

/// Credential failures while obtaining an access token.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token refresh rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint returned no access token")]
    EmptyToken,
}

/// Supplies bearer tokens for provider calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, AuthError>;
}

/// Returns the same token for every call.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }
}

/// Builds the token provider selected by the configuration.
///
/// `APP_ENV=local` uses `STATIC_ACCESS_TOKEN`; everything else performs the
/// OAuth refresh-token exchange.
pub fn from_config(config: &Config) -> Result<Arc<dyn TokenProvider>, ConfigError> {
    let lookup = |key: &str| std::env::var(key).ok();

    if config.is_local() {
        let token = resolve_required(&config.static_access_token, "STATIC_ACCESS_TOKEN", lookup)?;
        log::info!("Using static access token (APP_ENV=local)");
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    let client_id = config
        .oauth_client_id
        .clone()
        .ok_or(ConfigError::Missing {
            name: "OAUTH_CLIENT_ID",
        })?;
    let client_secret =
        resolve_required(&config.oauth_client_secret, "OAUTH_CLIENT_SECRET", lookup)?;
    let refresh_token =
        resolve_required(&config.refresh_token, "GMAIL_REFRESH_TOKEN", lookup)?;

    let provider = OAuthTokenProvider::new(
        config.oauth_token_url.clone(),
        client_id,
        client_secret,
        refresh_token,
    )?;
    Ok(Arc::new(provider))
}

fn resolve_required<F>(
    source: &SecretSource,
    name: &'static str,
    lookup: F,
) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    resolve_secret_optional(source, lookup)?.ok_or(ConfigError::Missing { name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretError;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_static_provider_returns_token() {
        let provider = StaticTokenProvider::new(SecretString::from("abc".to_string()));
        let token = provider.access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }

    #[tokio::test]
    async fn test_local_env_selects_static_provider() {
        let config = config_from(&[("APP_ENV", "local"), ("STATIC_ACCESS_TOKEN", "local-token")]);
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.access_token().await.unwrap().expose_secret(), "local-token");
    }

    #[test]
    fn test_local_env_without_token_is_missing() {
        let config = config_from(&[("APP_ENV", "local")]);
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::Missing {
                name: "STATIC_ACCESS_TOKEN"
            })
        ));
    }

    #[test]
    fn test_production_requires_oauth_settings() {
        let config = config_from(&[("OAUTH_CLIENT_SECRET", "s"), ("GMAIL_REFRESH_TOKEN", "r")]);
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::Missing {
                name: "OAUTH_CLIENT_ID"
            })
        ));

        let config = config_from(&[("OAUTH_CLIENT_ID", "id"), ("OAUTH_CLIENT_SECRET", "s")]);
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::Missing {
                name: "GMAIL_REFRESH_TOKEN"
            })
        ));

        let config = config_from(&[
            ("OAUTH_CLIENT_ID", "id"),
            ("OAUTH_CLIENT_SECRET", "s"),
            ("GMAIL_REFRESH_TOKEN", "r"),
        ]);
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn test_empty_secret_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let config = config_from(&[("APP_ENV", "local"), ("STATIC_ACCESS_TOKEN_FILE", path.as_str())]);
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::Secret(SecretError::Empty { .. }))
        ));
    }
}
