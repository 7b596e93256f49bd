//! Secret resolution for credentials read at startup.
//!
//! A secret is resolved from the first configured source, in this order:
//!
//! 1. **Direct value** (e.g. `GMAIL_REFRESH_TOKEN=...`)
//! 2. **File reference**, the Docker/Kubernetes secrets pattern
//!    (e.g. `GMAIL_REFRESH_TOKEN_FILE=/run/secrets/gmail_refresh_token`)
//! 3. **Env var reference**, naming another variable that holds the value
//!    (e.g. `GMAIL_REFRESH_TOKEN_ENV=MAILBOX_TOKEN`)

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided for {name} (set {name}, {name}_FILE or {name}_ENV)")]
    NoSourceProvided { name: String },

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Secret {name} resolved to an empty value")]
    Empty { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// The three ways a named secret can be supplied.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretSource {
    /// Logical name, used in error messages only.
    pub name: String,
    pub direct: Option<String>,
    pub file_path: Option<String>,
    pub env_var: Option<String>,
}

impl SecretSource {
    /// Reads `NAME`, `NAME_FILE` and `NAME_ENV` through `lookup`.
    pub fn from_lookup<F>(name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            name: name.to_string(),
            direct: lookup(name),
            file_path: lookup(&format!("{}_FILE", name)),
            env_var: lookup(&format!("{}_ENV", name)),
        }
    }

    /// True when at least one non-empty source is configured.
    pub fn is_configured(&self) -> bool {
        [&self.direct, &self.file_path, &self.env_var]
            .iter()
            .any(|s| s.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Resolves a secret from its sources in priority order.
///
/// `lookup` resolves the indirect env var reference; production code passes
/// a closure over `std::env::var`.
pub fn resolve_secret<F>(source: &SecretSource, lookup: F) -> Result<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_empty(&source.direct) {
        return Ok(SecretString::from(value.trim().to_string()));
    }

    if let Some(path) = non_empty(&source.file_path) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::Empty {
                name: source.name.clone(),
            });
        }
        return Ok(SecretString::from(trimmed.to_string()));
    }

    if let Some(var_name) = non_empty(&source.env_var) {
        let value = lookup(var_name).ok_or_else(|| SecretError::EnvVarNotSet {
            name: var_name.to_string(),
        })?;
        // Env vars injected from files often carry a trailing newline.
        return Ok(SecretString::from(value.trim().to_string()));
    }

    Err(SecretError::NoSourceProvided {
        name: source.name.clone(),
    })
}

/// Like [`resolve_secret`], but an unconfigured secret is `Ok(None)`.
pub fn resolve_secret_optional<F>(source: &SecretSource, lookup: F) -> Result<Option<SecretString>>
where
    F: Fn(&str) -> Option<String>,
{
    match resolve_secret(source, lookup) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSource")
            .field("name", &self.name)
            .field("direct", &self.direct.as_ref().map(|_| "[REDACTED]"))
            .field("file_path", &self.file_path)
            .field("env_var", &self.env_var)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Expands a leading `~` to the user's home directory.
///
/// `~user/path` is not supported.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
