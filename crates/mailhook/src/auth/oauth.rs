use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{AuthError, TokenProvider};

/// Maximum length for sanitized error bodies to prevent log flooding.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Tokens are refreshed this long before they expire.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Truncates an OAuth error body so token material never floods the logs.
fn sanitize_oauth_error_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_BUFFER < self.expires_at
    }
}

/// Exchanges a refresh token for short-lived access tokens.
///
/// The current token is cached until shortly before it expires. Concurrent
/// callers wait on the cache lock, so at most one refresh is in flight.
pub struct OAuthTokenProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenProvider {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: SecretString,
        refresh_token: SecretString,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token_url,
            client_id,
            client_secret,
            refresh_token,
            cached: Mutex::new(None),
        })
    }

    async fn refresh(&self) -> Result<TokenResponse, AuthError> {
        info!("Refreshing access token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", self.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.client.post(&self.token_url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status,
                body: sanitize_oauth_error_body(&body),
            });
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        debug!("Access token refreshed (expires_in={:?})", token.expires_in);
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(SecretString::from(token.access_token.clone()));
        }

        let response = self.refresh().await?;
        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = SecretString::from(response.access_token.clone());
        *cached = Some(CachedToken {
            access_token: response.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}
