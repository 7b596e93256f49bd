use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use mailhook::WatchResponse;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub topic_name: Option<String>,
}

/// `POST /renew-watch`: renews the watch, optionally for an explicit topic.
pub async fn renew_watch(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WatchResponse>> {
    let request: RenewRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RenewRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid body: {}", e)))?
    };

    let response = state.watch.renew(request.topic_name.as_deref()).await?;
    Ok(Json(response))
}
