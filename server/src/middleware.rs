//! Identity-aware-proxy gatekeeper for the admin API.
//!
//! The proxy in front of the service authenticates users and forwards their
//! identity in `X-Goog-Authenticated-User-Email`. Only allowlisted
//! identities reach the admin handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::{debug, warn};

pub const IDENTITY_HEADER: &str = "x-goog-authenticated-user-email";
const IDENTITY_PREFIX: &str = "accounts.google.com:";

/// Authenticated admin, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity(pub Option<String>);

impl AdminIdentity {
    pub fn email(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Allowlist check for admin requests.
pub struct Gatekeeper {
    allowlist: HashSet<String>,
    bypass: bool,
}

impl Gatekeeper {
    /// `bypass` disables the check entirely (local development).
    pub fn new(allowlist: impl IntoIterator<Item = String>, bypass: bool) -> Self {
        Self {
            allowlist: allowlist
                .into_iter()
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            bypass,
        }
    }

    /// Returns the admitted identity, or the rejection reason.
    pub fn admit(&self, headers: &HeaderMap) -> Result<AdminIdentity, &'static str> {
        let email = identity_from(headers);

        if self.bypass {
            return Ok(AdminIdentity(email));
        }

        let Some(email) = email else {
            return Err("Forbidden: No IAP Identity");
        };
        if !self.allowlist.contains(&email.to_ascii_lowercase()) {
            warn!("Admin access denied for {}", email);
            return Err("Forbidden: User not allowed");
        }

        debug!("Admin access granted for {}", email);
        Ok(AdminIdentity(Some(email)))
    }
}

fn identity_from(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(IDENTITY_HEADER)?.to_str().ok()?.trim();
    let email = raw.strip_prefix(IDENTITY_PREFIX).unwrap_or(raw).trim();
    (!email.is_empty()).then(|| email.to_string())
}

/// Axum middleware that rejects non-allowlisted callers with 403.
pub async fn gatekeeper_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gatekeeper.admit(request.headers()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(reason) => (StatusCode::FORBIDDEN, reason).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(identity: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = identity {
            headers.insert(IDENTITY_HEADER, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn gatekeeper(bypass: bool) -> Gatekeeper {
        Gatekeeper::new(vec!["Admin@Example.com".to_string()], bypass)
    }

    #[test]
    fn test_prefixed_identity_is_admitted_case_insensitively() {
        let identity = gatekeeper(false)
            .admit(&headers(Some("accounts.google.com:admin@EXAMPLE.com")))
            .unwrap();
        assert_eq!(identity.email(), Some("admin@EXAMPLE.com"));
    }

    #[test]
    fn test_missing_or_empty_identity_is_rejected() {
        assert!(gatekeeper(false).admit(&headers(None)).is_err());
        assert!(gatekeeper(false).admit(&headers(Some(""))).is_err());
        assert!(gatekeeper(false)
            .admit(&headers(Some("accounts.google.com:")))
            .is_err());
    }

    #[test]
    fn test_unlisted_identity_is_rejected() {
        let err = gatekeeper(false)
            .admit(&headers(Some("intruder@example.com")))
            .unwrap_err();
        assert_eq!(err, "Forbidden: User not allowed");
    }

    #[test]
    fn test_bypass_admits_anyone() {
        assert_eq!(gatekeeper(true).admit(&headers(None)).unwrap(), AdminIdentity(None));
        assert_eq!(
            gatekeeper(true).admit(&headers(Some("dev@local"))).unwrap().email(),
            Some("dev@local")
        );
    }
}
