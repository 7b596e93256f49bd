//! Gmail REST wire types (only the fields this service reads).
//!
//! Gmail encodes 64-bit integers as JSON strings; the deserializers below
//! accept either a string or a number.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListResponse {
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub messages_added: Vec<HistoryMessageChange>,
    #[serde(default)]
    pub labels_added: Vec<HistoryMessageChange>,
    #[serde(default)]
    pub labels_removed: Vec<HistoryMessageChange>,
}

/// Shared shape of `messagesAdded`, `labelsAdded` and `labelsRemoved` items.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryMessageChange {
    pub message: Option<MessageRef>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default, deserialize_with = "de_u64")]
    pub history_id: u64,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest<'a> {
    pub topic_name: &'a str,
    pub label_ids: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailWatchResponse {
    #[serde(deserialize_with = "de_u64")]
    pub history_id: u64,
    #[serde(deserialize_with = "de_i64")]
    pub expiration: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber<T> {
    Number(T),
    String(String),
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match StringOrNumber::<u64>::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match StringOrNumber::<i64>::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accepts_string_history_id() {
        let msg: GmailMessage = serde_json::from_str(
            r#"{"id":"m1","threadId":"t1","historyId":"98765","labelIds":["INBOX"],"snippet":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.history_id, 98765);
        assert_eq!(msg.label_ids, vec!["INBOX"]);
    }

    #[test]
    fn test_message_missing_optional_fields() {
        let msg: GmailMessage = serde_json::from_str(r#"{"id":"m1","historyId":12}"#).unwrap();
        assert_eq!(msg.history_id, 12);
        assert!(msg.label_ids.is_empty());
        assert!(msg.snippet.is_empty());
    }

    #[test]
    fn test_watch_response_strings() {
        let resp: GmailWatchResponse =
            serde_json::from_str(r#"{"historyId":"555","expiration":"1700000000000"}"#).unwrap();
        assert_eq!(resp.history_id, 555);
        assert_eq!(resp.expiration, 1_700_000_000_000);
    }

    #[test]
    fn test_history_record_without_changes() {
        let resp: HistoryListResponse =
            serde_json::from_str(r#"{"history":[{"id":"1","messages":[{"id":"x"}]}],"historyId":"2"}"#)
                .unwrap();
        assert_eq!(resp.history.len(), 1);
        assert!(resp.history[0].messages_added.is_empty());
        assert!(resp.next_page_token.is_none());
    }
}
