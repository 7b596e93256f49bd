//! Pub/Sub push envelope decoding.
//!
//! The outer envelope is transport framing and must be well formed. The
//! inner payload is produced by the mail provider; a payload that cannot be
//! understood is acknowledged and dropped, because redelivery would never
//! make it valid.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Invalid push envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    data: String,
}

/// The provider's notification: which mailbox changed, and up to where.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    #[serde(default)]
    pub email_address: String,
    #[serde(deserialize_with = "de_history_id")]
    pub history_id: u64,
}

fn de_history_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        String(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Decodes a push request body.
///
/// Returns `Err` when the envelope or its base64 data is malformed, and
/// `Ok(None)` when the decoded payload is not a valid notification.
pub fn decode(body: &[u8]) -> Result<Option<PushNotification>, PushError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)?;
    let payload = STANDARD.decode(envelope.message.data.trim())?;

    match serde_json::from_slice::<PushNotification>(&payload) {
        Ok(notification) => Ok(Some(notification)),
        Err(e) => {
            tracing::warn!("Dropping push with unreadable payload: {}", e);
            Ok(None)
        }
    }
}
