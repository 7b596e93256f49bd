pub mod admin;
pub mod push;
pub mod renew;

use std::path::Path;
use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::gatekeeper_middleware;
use crate::state::AppState;

const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

async fn health() -> &'static str {
    "OK"
}

/// Builds the full application router.
///
/// When `static_dir` exists it is served for every unmatched path, with
/// `index.html` as the fallback for client-side routes.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let admin_routes = Router::new()
        .route("/stats", get(admin::get_stats))
        .route("/filters", get(admin::list_filters).post(admin::create_filter))
        .route(
            "/filters/:id",
            patch(admin::update_filter).delete(admin::delete_filter),
        )
        .route("/events", get(admin::get_events))
        .route("/actions/:action", post(admin::trigger_action))
        .layer(middleware::from_fn_with_state(
            state.gatekeeper.clone(),
            gatekeeper_middleware,
        ))
        .layer(TimeoutLayer::new(ADMIN_REQUEST_TIMEOUT));

    let mut router = Router::new()
        .route("/health", get(health).post(health))
        .route("/push", post(push::receive_push))
        .route("/renew-watch", post(renew::renew_watch))
        .nest("/admin", admin_routes)
        .with_state(state);

    if let Some(dir) = static_dir.filter(|d| d.is_dir()) {
        let index = dir.join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use mailhook::db::{email_repo, filter_repo, stats_repo, watch_repo};
    use mailhook::provider::InMemoryMailProvider;
    use mailhook::repository::day_key;
    use mailhook::{
        ChangeKind, ChangedItem, Database, Message, Reconciler, SqliteHistoryRepository,
        WatchResponse, WatchService,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::middleware::{Gatekeeper, IDENTITY_HEADER};

    const LABEL: &str = "Label_target";
    const ADMIN: &str = "admin@example.com";

    struct Harness {
        db: Database,
        provider: Arc<InMemoryMailProvider>,
        router: Router,
    }

    fn harness_with(static_dir: Option<&Path>) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(InMemoryMailProvider::new());
        provider.set_watch_response(Some(WatchResponse {
            history_id: 321,
            expiration: 1_800_000_000_000,
        }));
        let repo = Arc::new(SqliteHistoryRepository::new(db.clone()));
        let state = AppState {
            db: db.clone(),
            repo: repo.clone(),
            reconciler: Reconciler::new(provider.clone(), repo.clone(), Some(LABEL.to_string())),
            watch: WatchService::new(
                provider.clone(),
                repo,
                "acme",
                Some("projects/acme/topics/mail".to_string()),
            ),
            gatekeeper: Arc::new(Gatekeeper::new(vec![ADMIN.to_string()], false)),
        };
        Harness {
            db,
            provider,
            router: build_router(state, static_dir),
        }
    }

    fn harness() -> Harness {
        harness_with(None)
    }

    fn push_body(payload: &str) -> Body {
        Body::from(
            json!({ "message": { "data": STANDARD.encode(payload), "messageId": "1" } }).to_string(),
        )
    }

    fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(IDENTITY_HEADER, format!("accounts.google.com:{}", ADMIN));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    fn seed_mailbox(provider: &InMemoryMailProvider) {
        provider.push_change(ChangedItem::new("A", ChangeKind::MessageAdded));
        provider.push_change(ChangedItem::new("B", ChangeKind::MessageAdded));
        provider.push_change(ChangedItem::new("C", ChangeKind::LabelAdded));
        provider.insert_message(Message {
            id: "A".to_string(),
            history_id: 10,
            label_ids: vec![LABEL.to_string()],
            snippet: "a".to_string(),
        });
        provider.insert_message(Message {
            id: "B".to_string(),
            history_id: 11,
            label_ids: vec!["INBOX".to_string()],
            snippet: "b".to_string(),
        });
        provider.fail_fetch("C");
    }

    #[tokio::test]
    async fn test_health_get_and_post() {
        let h = harness();
        for method in ["GET", "POST"] {
            let request = Request::builder()
                .method(method)
                .uri("/health")
                .body(Body::empty())
                .unwrap();
            let (status, body) = send(&h.router, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Value::String("OK".to_string()));
        }
    }

    #[tokio::test]
    async fn test_push_runs_a_pass() {
        let h = harness();
        seed_mailbox(&h.provider);

        let request = Request::builder()
            .method("POST")
            .uri("/push")
            .body(push_body(r#"{"emailAddress":"me@example.com","historyId":"100"}"#))
            .unwrap();
        let (status, _) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.provider.list_calls(), 1);
        assert_eq!(email_repo::count(&h.db).unwrap(), 1);
        let today = day_key(chrono::Utc::now());
        let stats = stats_repo::query_range(&h.db, &today, &today).unwrap();
        assert_eq!(stats[0].received, 3);
        assert_eq!(stats[0].processed_ok, 1);
        assert_eq!(stats[0].processed_error, 1);
    }

    #[tokio::test]
    async fn test_push_with_bad_envelope_is_400() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/push")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/push")
            .body(Body::from(r#"{"message":{"data":"***"}}"#))
            .unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.provider.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_push_with_bad_payload_is_acknowledged() {
        let h = harness();
        seed_mailbox(&h.provider);

        let request = Request::builder()
            .method("POST")
            .uri("/push")
            .body(push_body("not json at all"))
            .unwrap();
        let (status, _) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.provider.list_calls(), 0);
        assert_eq!(email_repo::count(&h.db).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_pass_failure_is_still_200() {
        let h = harness();
        h.provider.fail_list(true);

        let request = Request::builder()
            .method("POST")
            .uri("/push")
            .body(push_body(r#"{"emailAddress":"me@example.com","historyId":5}"#))
            .unwrap();
        let (status, _) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.provider.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_renew_watch_endpoint() {
        let h = harness();

        let request = Request::builder()
            .method("POST")
            .uri("/renew-watch")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"historyId": 321, "expiration": 1_800_000_000_000i64}));

        let request = Request::builder()
            .method("POST")
            .uri("/renew-watch")
            .body(Body::from(r#"{"topicName":"projects/acme/topics/override"}"#))
            .unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            h.provider.watched_topics(),
            vec!["projects/acme/topics/mail", "projects/acme/topics/override"]
        );
        assert_eq!(watch_repo::latest(&h.db).unwrap().unwrap().history_id, 321);
    }

    #[tokio::test]
    async fn test_renew_watch_failure_is_500() {
        let h = harness();
        h.provider.set_watch_response(None);

        let request = Request::builder()
            .method("POST")
            .uri("/renew-watch")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_admin_requires_allowlisted_identity() {
        let h = harness();

        let request = Request::builder().uri("/admin/stats").body(Body::empty()).unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/admin/stats")
            .header(IDENTITY_HEADER, "accounts.google.com:intruder@example.com")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&h.router, admin_request("GET", "/admin/stats", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_stats_range() {
        let h = harness();
        stats_repo::increment(&h.db, "2026-01-01", 1, 1, 0, "2026-01-01T00:00:00.000Z").unwrap();
        stats_repo::increment(&h.db, "2026-01-05", 2, 1, 1, "2026-01-05T00:00:00.000Z").unwrap();
        stats_repo::increment(&h.db, "2026-02-01", 9, 9, 0, "2026-02-01T00:00:00.000Z").unwrap();

        let (status, body) = send(
            &h.router,
            admin_request("GET", "/admin/stats?from=2026-01-01&to=2026-01-31", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let days: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["day"].as_str().unwrap())
            .collect();
        assert_eq!(days, vec!["2026-01-05", "2026-01-01"]);

        let (status, _) = send(&h.router, admin_request("GET", "/admin/stats?from=yesterday", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_filters_crud() {
        let h = harness();

        let (status, created) = send(
            &h.router,
            admin_request(
                "POST",
                "/admin/filters",
                Some(json!({"name": "invoices", "priority": 10, "gmail_query": "from:billing@example.com"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["updated_by"], ADMIN);
        assert_eq!(created["enabled"], true);
        let id = created["id"].as_str().unwrap().to_string();

        send(
            &h.router,
            admin_request("POST", "/admin/filters", Some(json!({"name": "first", "priority": 1}))),
        )
        .await;

        let (status, list) = send(&h.router, admin_request("GET", "/admin/filters", None)).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["first", "invoices"]);

        let (status, updated) = send(
            &h.router,
            admin_request("PATCH", &format!("/admin/filters/{}", id), Some(json!({"enabled": false}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["enabled"], false);
        assert_eq!(updated["name"], "invoices");

        let (status, _) = send(
            &h.router,
            admin_request("PATCH", "/admin/filters/missing", Some(json!({"enabled": true}))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(&h.router, admin_request("DELETE", &format!("/admin/filters/{}", id), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            send(&h.router, admin_request("DELETE", &format!("/admin/filters/{}", id), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(filter_repo::list(&h.db).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_events_limit() {
        let h = harness();
        seed_mailbox(&h.provider);
        h.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/push")
                    .body(push_body(r#"{"historyId":100}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let (status, events) = send(&h.router, admin_request("GET", "/admin/events", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 2);

        let (_, events) = send(&h.router, admin_request("GET", "/admin/events?limit=1", None)).await;
        assert_eq!(events.as_array().unwrap().len(), 1);

        let (status, events) =
            send(&h.router, admin_request("GET", "/admin/events?limit=abc", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_actions() {
        let h = harness();
        seed_mailbox(&h.provider);

        let (status, _) = send(&h.router, admin_request("POST", "/admin/actions/resync", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&h.router, admin_request("POST", "/admin/actions/renew-watch", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["watch"]["historyId"], 321);

        let (status, body) = send(&h.router, admin_request("POST", "/admin/actions/resync", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cursor"], 321);
        assert_eq!(body["summary"]["processed_ok"], 1);

        let (status, _) =
            send(&h.router, admin_request("POST", "/admin/actions/reprocess", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_static_fallback_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>admin ui</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        let h = harness_with(Some(dir.path()));

        let request = Request::builder().uri("/app.js").body(Body::empty()).unwrap();
        let (status, body) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("console.log(1)".to_string()));

        let request = Request::builder().uri("/dashboard/filters").body(Body::empty()).unwrap();
        let (status, body) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_str().unwrap().contains("admin ui"));
    }
}
