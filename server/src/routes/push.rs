use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, info, warn};
use mailhook::ingest::decode_push;

use crate::state::AppState;

/// `POST /push`: Pub/Sub push delivery.
///
/// Malformed envelopes are rejected with 400. Everything else is
/// acknowledged with 200, including unreadable payloads and failed passes,
/// so that Pub/Sub does not redeliver forever.
#[tracing::instrument(name = "push", skip_all)]
pub async fn receive_push(State(state): State<AppState>, body: Bytes) -> Response {
    let notification = match decode_push(&body) {
        Ok(Some(notification)) => notification,
        Ok(None) => return StatusCode::OK.into_response(),
        Err(e) => {
            warn!("Rejecting push: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid Body").into_response();
        }
    };

    info!(
        "Received push for {} (historyId={})",
        notification.email_address, notification.history_id
    );

    if let Err(e) = state.reconciler.reconcile(notification.history_id).await {
        error!("Error processing push: {}", e);
    }

    StatusCode::OK.into_response()
}
