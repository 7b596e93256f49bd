use std::sync::Arc;

use mailhook::{Database, HistoryRepository, Reconciler, WatchService};

use crate::middleware::Gatekeeper;

/// Shared handler state. Every field is a cheap clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub repo: Arc<dyn HistoryRepository>,
    pub reconciler: Reconciler,
    pub watch: WatchService,
    pub gatekeeper: Arc<Gatekeeper>,
}
