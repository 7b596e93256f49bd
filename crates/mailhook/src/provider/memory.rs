use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChangedItem, Cursor, MailProvider, Message, ProviderError, WatchResponse};

#[derive(Default)]
struct Mailbox {
    history: Vec<ChangedItem>,
    messages: HashMap<String, Message>,
    failing_fetches: HashSet<String>,
    fail_list: bool,
    list_delay: Option<Duration>,
    fetch_delays: HashMap<String, Duration>,
    watch_response: Option<WatchResponse>,
    watched_topics: Vec<String>,
}

/// Scripted mailbox for local runs and tests.
///
/// Every non-zero cursor returns the same configured history. Call counters
/// let callers assert how many provider round-trips a pass made.
#[derive(Default)]
pub struct InMemoryMailProvider {
    mailbox: Mutex<Mailbox>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryMailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_mailbox<T>(&self, f: impl FnOnce(&mut Mailbox) -> T) -> T {
        // A poisoned lock only means another test thread panicked.
        let mut mailbox = match self.mailbox.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut mailbox)
    }

    /// Appends a change entry to the history.
    pub fn push_change(&self, item: ChangedItem) {
        self.with_mailbox(|m| m.history.push(item));
    }

    /// Makes `message` fetchable by its id.
    pub fn insert_message(&self, message: Message) {
        self.with_mailbox(|m| {
            m.messages.insert(message.id.clone(), message);
        });
    }

    /// Makes fetching `message_id` fail with a 500 status.
    pub fn fail_fetch(&self, message_id: &str) {
        self.with_mailbox(|m| {
            m.failing_fetches.insert(message_id.to_string());
        });
    }

    pub fn fail_list(&self, fail: bool) {
        self.with_mailbox(|m| m.fail_list = fail);
    }

    /// Delays every history listing, for timeout handling.
    pub fn set_list_delay(&self, delay: Duration) {
        self.with_mailbox(|m| m.list_delay = Some(delay));
    }

    /// `None` makes `watch` fail with a 403 status.
    pub fn set_watch_response(&self, response: Option<WatchResponse>) {
        self.with_mailbox(|m| m.watch_response = response);
    }

    /// Delays fetching `message_id`, for deadlines that expire mid-pass.
    pub fn set_fetch_delay(&self, message_id: &str, delay: Duration) {
        self.with_mailbox(|m| {
            m.fetch_delays.insert(message_id.to_string(), delay);
        });
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Topics passed to `watch`, in call order.
    pub fn watched_topics(&self) -> Vec<String> {
        self.with_mailbox(|m| m.watched_topics.clone())
    }
}

#[async_trait]
impl MailProvider for InMemoryMailProvider {
    async fn list_changed(&self, cursor: Cursor) -> Result<Vec<ChangedItem>, ProviderError> {
        if cursor == 0 {
            return Ok(Vec::new());
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let (delay, fail, history) =
            self.with_mailbox(|m| (m.list_delay, m.fail_list, m.history.clone()));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ProviderError::Status {
                operation: "history.list",
                status: 503,
                body: "history unavailable".to_string(),
            });
        }
        Ok(history)
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.with_mailbox(|m| m.fetch_delays.get(message_id).copied()) {
            tokio::time::sleep(delay).await;
        }

        self.with_mailbox(|m| {
            if m.failing_fetches.contains(message_id) {
                return Err(ProviderError::Status {
                    operation: "messages.get",
                    status: 500,
                    body: "backend error".to_string(),
                });
            }
            m.messages
                .get(message_id)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(format!("message {}", message_id)))
        })
    }

    async fn watch(&self, topic: &str) -> Result<WatchResponse, ProviderError> {
        self.with_mailbox(|m| {
            m.watched_topics.push(topic.to_string());
            m.watch_response.ok_or(ProviderError::Status {
                operation: "watch",
                status: 403,
                body: "topic not authorized".to_string(),
            })
        })
    }
}
