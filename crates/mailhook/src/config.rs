//! Runtime configuration read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::db::default_database_path;
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::secrets::{expand_home, SecretSource};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_APP_ENV: &str = "production";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com";
pub const DEFAULT_STATIC_DIR: &str = "./web/out";
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 30;

/// Fully resolved service settings.
///
/// Secrets are kept as [`SecretSource`]s and resolved when the credential
/// provider is built, so that `Config` can be logged safely.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub port: u16,
    pub app_env: String,
    pub pubsub_topic: Option<String>,
    pub target_label: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: SecretSource,
    pub oauth_token_url: String,
    pub refresh_token: SecretSource,
    pub static_access_token: SecretSource,
    pub gmail_api_base_url: String,
    pub database_path: PathBuf,
    /// Lowercased admin emails.
    pub admin_allowlist: Vec<String>,
    pub static_dir: PathBuf,
    pub pass_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let pass_timeout_secs = match get("PASS_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "PASS_TIMEOUT_SECS",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(secs) => secs,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "PASS_TIMEOUT_SECS",
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_PASS_TIMEOUT_SECS,
        };

        let database_path = match get("DATABASE_PATH") {
            Some(path) => PathBuf::from(expand_home(&path)),
            None => default_database_path().unwrap_or_else(|| PathBuf::from("mailhook.db")),
        };

        let admin_allowlist = get("ADMIN_ALLOWLIST")
            .map(|raw| parse_allowlist(&raw))
            .unwrap_or_default();

        Ok(Self {
            project_id: get("GOOGLE_CLOUD_PROJECT").unwrap_or_default(),
            port,
            app_env: get("APP_ENV").unwrap_or_else(|| DEFAULT_APP_ENV.to_string()),
            pubsub_topic: get("GMAIL_PUBSUB_TOPIC"),
            target_label: get("GMAIL_TARGET_LABEL"),
            oauth_client_id: get("OAUTH_CLIENT_ID"),
            oauth_client_secret: SecretSource::from_lookup("OAUTH_CLIENT_SECRET", &lookup),
            oauth_token_url: get("OAUTH_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            refresh_token: SecretSource::from_lookup("GMAIL_REFRESH_TOKEN", &lookup),
            static_access_token: SecretSource::from_lookup("STATIC_ACCESS_TOKEN", &lookup),
            gmail_api_base_url: get("GMAIL_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE_URL.to_string()),
            database_path,
            admin_allowlist,
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            pass_timeout: Duration::from_secs(pass_timeout_secs),
            log_format: LogFormat::from_setting(get("LOG_FORMAT").as_deref()),
        })
    }

    /// `APP_ENV=local` switches to the static token provider and disables
    /// the admin gatekeeper.
    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("local")
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}
