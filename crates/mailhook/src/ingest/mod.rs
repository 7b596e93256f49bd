//! Push-driven ingestion: envelope decoding, reconciliation passes and
//! watch renewal.

pub mod push;
pub mod reconcile;
pub mod renewal;

pub use push::{decode as decode_push, PushError, PushNotification};
pub use reconcile::{PassSummary, ReconcileError, Reconciler, DEFAULT_PASS_TIMEOUT};
pub use renewal::{RenewError, WatchService, DEFAULT_TOPIC_NAME};
