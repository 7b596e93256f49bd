//! Admin API handlers. All routes sit behind the gatekeeper.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Duration, NaiveDate, Utc};
use log::info;
use mailhook::db::event_repo::{self, EventRow};
use mailhook::db::filter_repo::{self, FilterPatch, FilterRow, NewFilter};
use mailhook::db::stats_repo::{self, DailyStatRow};
use mailhook::repository::timestamp;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AdminIdentity;
use crate::state::AppState;

pub const DEFAULT_STATS_DAYS: i64 = 30;
pub const DEFAULT_EVENTS_LIMIT: u32 = 50;
pub const MAX_EVENTS_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<String>,
}

fn parse_day(name: &str, value: Option<&str>, default: NaiveDate) -> ApiResult<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default.format("%Y-%m-%d").to_string()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .map_err(|_| ApiError::BadRequest(format!("Invalid {} date '{}', expected YYYY-MM-DD", name, raw))),
    }
}

/// Non-positive or unparsable limits fall back to the default.
fn events_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|l| *l > 0)
        .map(|l| l.min(MAX_EVENTS_LIMIT as i64) as u32)
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
}

/// `GET /admin/stats?from=&to=`: daily counters, newest day first.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<Vec<DailyStatRow>>> {
    let today = Utc::now().date_naive();
    let from = parse_day("from", query.from.as_deref(), today - Duration::days(DEFAULT_STATS_DAYS))?;
    let to = parse_day("to", query.to.as_deref(), today)?;

    let rows = state
        .db
        .run_blocking(move |db| stats_repo::query_range(db, &from, &to))
        .await?;
    Ok(Json(rows))
}

/// `GET /admin/events?limit=`: most recent events.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<EventRow>>> {
    let limit = events_limit(query.limit.as_deref());
    let rows = state
        .db
        .run_blocking(move |db| event_repo::list_recent(db, limit))
        .await?;
    Ok(Json(rows))
}

/// `GET /admin/filters`: all filters by ascending priority.
pub async fn list_filters(State(state): State<AppState>) -> ApiResult<Json<Vec<FilterRow>>> {
    let rows = state.db.run_blocking(filter_repo::list).await?;
    Ok(Json(rows))
}

/// `POST /admin/filters`
pub async fn create_filter(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Json(input): Json<NewFilter>,
) -> ApiResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Filter name must not be empty".to_string()));
    }

    let updated_by = identity.0;
    let row = state
        .db
        .run_blocking(move |db| {
            filter_repo::create(db, &input, updated_by.as_deref(), &timestamp(Utc::now()))
        })
        .await?;

    info!("Filter {} created by {:?}", row.id, row.updated_by);
    Ok((StatusCode::CREATED, Json(row)))
}

/// `PATCH /admin/filters/:id`
pub async fn update_filter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(identity): Extension<AdminIdentity>,
    Json(patch): Json<FilterPatch>,
) -> ApiResult<Json<FilterRow>> {
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("Filter name must not be empty".to_string()));
    }

    let updated_by = identity.0;
    let lookup_id = id.clone();
    let row = state
        .db
        .run_blocking(move |db| {
            filter_repo::update(
                db,
                &lookup_id,
                &patch,
                updated_by.as_deref(),
                &timestamp(Utc::now()),
            )
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Filter {} not found", id)))?;

    Ok(Json(row))
}

/// `DELETE /admin/filters/:id`
pub async fn delete_filter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let lookup_id = id.clone();
    let deleted = state
        .db
        .run_blocking(move |db| filter_repo::delete(db, &lookup_id))
        .await?;

    if !deleted {
        return Err(ApiError::NotFound(format!("Filter {} not found", id)));
    }
    info!("Filter {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/actions/:action`: `renew-watch` or `resync`.
pub async fn trigger_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Extension(identity): Extension<AdminIdentity>,
) -> ApiResult<Json<Value>> {
    info!("Admin action '{}' triggered by {:?}", action, identity.email());

    match action.as_str() {
        "renew-watch" => {
            let response = state.watch.renew(None).await?;
            Ok(Json(json!({ "action": action, "watch": response })))
        }
        "resync" => {
            let latest = state.repo.latest_watch_status().await?.ok_or_else(|| {
                ApiError::BadRequest("No watch status recorded yet; renew the watch first".to_string())
            })?;
            let summary = state.reconciler.reconcile(latest.history_id).await?;
            Ok(Json(json!({
                "action": action,
                "cursor": latest.history_id,
                "summary": summary,
            })))
        }
        other => Err(ApiError::BadRequest(format!("Unknown action '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_limit() {
        assert_eq!(events_limit(None), 50);
        assert_eq!(events_limit(Some("10")), 10);
        assert_eq!(events_limit(Some("0")), 50);
        assert_eq!(events_limit(Some("-3")), 50);
        assert_eq!(events_limit(Some("lots")), 50);
        assert_eq!(events_limit(Some("100000")), 500);
    }

    #[test]
    fn test_parse_day() {
        let default = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(parse_day("from", None, default).unwrap(), "2026-01-31");
        assert_eq!(parse_day("from", Some(" "), default).unwrap(), "2026-01-31");
        assert_eq!(parse_day("from", Some("2026-02-03"), default).unwrap(), "2026-02-03");
        assert!(parse_day("from", Some("03/02/2026"), default).is_err());
    }
}
