use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use squarepool::{
    adapters::MemoryStore,
    api::{auth::ADMIN_TOKEN_HEADER, create_router, AppState},
    clock::SystemClock,
    config::AdminConfig,
    domain::{GameQuery, GridDefaults, LiveGame, ScoreFeed},
    error::FeedError,
    services::{LiveScoreSync, LiveSyncConfig, PoolService},
};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-test-token";

/// Scoreboard that never lists the game
struct EmptyScoreboard;

#[async_trait]
impl ScoreFeed for EmptyScoreboard {
    async fn fetch_game(&self, _query: &GameQuery) -> Result<LiveGame, FeedError> {
        Err(FeedError::NotFoundYet)
    }
}

fn test_app() -> Router {
    let defaults = GridDefaults::default();
    let store = Arc::new(MemoryStore::new(&defaults, Utc::now()));
    let service = Arc::new(PoolService::new(store, Arc::new(SystemClock), defaults));
    let live = Arc::new(LiveScoreSync::new(
        Arc::new(EmptyScoreboard),
        Arc::clone(&service),
        LiveSyncConfig::default(),
    ));
    let admin = AdminConfig {
        token: Some(ADMIN_TOKEN.to_string()),
        ..Default::default()
    };
    create_router(AppState::new(service, live, admin))
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (key, value) in headers {
        request_builder = request_builder.header(*key, *value);
    }

    let request = if let Some(payload) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("failed to build json request")
    } else {
        request_builder
            .body(Body::empty())
            .expect("failed to build empty request")
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

fn admin() -> [(&'static str, &'static str); 1] {
    [(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)]
}

async fn claim(app: &Router, row: i64, col: i64, email: &str) -> (StatusCode, Value) {
    send_json(
        app,
        Method::POST,
        "/api/grids/1/claim",
        &[],
        Some(json!({ "row": row, "col": col, "name": "Pat", "email": email })),
    )
    .await
}

fn square<'a>(grid: &'a Value, row: u64, col: u64) -> &'a Value {
    grid["squares"]
        .as_array()
        .expect("squares array")
        .iter()
        .find(|s| s["row"] == row && s["col"] == col)
        .expect("square present")
}

#[tokio::test]
async fn health_reports_store() {
    let app = test_app();
    let (status, body) = send_json(&app, Method::GET, "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn public_view_hides_emails_admin_view_shows_them() {
    let app = test_app();
    let (status, _) = claim(&app, 2, 3, "Pat@Example.com").await;
    assert_eq!(status, StatusCode::OK);

    let (status, public) = send_json(&app, Method::GET, "/api/grids/1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["squares_sold"], 1);
    assert_eq!(public["is_admin"], false);
    let cell = square(&public, 2, 3);
    assert_eq!(cell["owner_name"], "Pat");
    assert!(cell.get("owner_email").is_none());
    assert!(cell.get("paid").is_none());

    let (_, private) = send_json(&app, Method::GET, "/api/grids/1", &admin(), None).await;
    assert_eq!(private["is_admin"], true);
    let cell = square(&private, 2, 3);
    assert_eq!(cell["owner_email"], "pat@example.com");
    assert_eq!(cell["paid"], false);
}

#[tokio::test]
async fn second_claim_on_a_square_conflicts() {
    let app = test_app();
    assert_eq!(claim(&app, 0, 0, "a@example.com").await.0, StatusCode::OK);

    let (status, body) = claim(&app, 0, 0, "b@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_type"], "conflict");
    assert_eq!(body["error"], "This square is already taken");
}

#[tokio::test]
async fn out_of_range_claim_is_a_validation_error() {
    let app = test_app();
    let (status, body) = claim(&app, 10, 0, "a@example.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "validation");

    let (status, _) = claim(&app, 1, 1, "not-an-email").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_claim_reports_partial_success() {
    let app = test_app();
    assert_eq!(claim(&app, 4, 4, "a@example.com").await.0, StatusCode::OK);

    let (status, report) = send_json(
        &app,
        Method::POST,
        "/api/grids/1/claims",
        &[],
        Some(json!({
            "squares": [{ "row": 4, "col": 4 }, { "row": 4, "col": 5 }],
            "name": "Sam",
            "email": "sam@example.com",
            "player_name": "Jordan"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success_count"], 1);
    assert_eq!(report["state"], "partially_succeeded");
    assert_eq!(report["errors"][0]["row"], 4);
    assert_eq!(report["errors"][0]["col"], 4);
    assert_eq!(report["errors"][0]["error_type"], "conflict");
}

#[tokio::test]
async fn batch_over_limit_is_rejected_whole() {
    let app = test_app();
    let squares: Vec<Value> = (0..6).map(|c| json!({ "row": 9, "col": c })).collect();
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/grids/1/claims",
        &[],
        Some(json!({ "squares": squares, "name": "Sam", "email": "sam@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, grid) = send_json(&app, Method::GET, "/api/grids/1", &[], None).await;
    assert_eq!(grid["squares_sold"], 0);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let app = test_app();
    let (status, body) =
        send_json(&app, Method::POST, "/api/admin/grids/1/randomize", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_type"], "unauthorized");

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/admin/grids/1/randomize",
        &[("authorization", "Bearer admin-test-token")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mut rows: Vec<u64> = body["row_numbers"]
        .as_array()
        .expect("row numbers")
        .iter()
        .filter_map(Value::as_u64)
        .collect();
    rows.sort_unstable();
    assert_eq!(rows, (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn login_cookie_grants_admin() {
    let app = test_app();
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/admin/login",
        &[],
        Some(json!({ "admin_token": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/admin/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "admin_token": ADMIN_TOKEN }).to_string()))
        .expect("failed to build login request");
    let response = app.clone().oneshot(request).await.expect("login failed");
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .expect("session cookie")
        .to_string();
    let session = set_cookie.split(';').next().expect("cookie pair").to_string();
    assert!(!session.contains(ADMIN_TOKEN));

    let (_, status_body) = send_json(
        &app,
        Method::GET,
        "/api/admin/status",
        &[("cookie", session.as_str())],
        None,
    )
    .await;
    assert_eq!(status_body["authenticated"], true);
    assert_eq!(status_body["auth_required"], true);
}

#[tokio::test]
async fn main_grid_cannot_be_deleted() {
    let app = test_app();
    let (status, body) =
        send_json(&app, Method::DELETE, "/api/admin/grids/1", &admin(), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_type"], "state");

    let (status, created) = send_json(
        &app,
        Method::POST,
        "/api/admin/grids",
        &admin(),
        Some(json!({ "name": "Side Grid" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["grid"]["id"].as_i64().expect("grid id");
    assert_ne!(id, 1);

    let uri = format!("/api/admin/grids/{}", id);
    assert_eq!(send_json(&app, Method::DELETE, &uri, &admin(), None).await.0, StatusCode::OK);
    let uri = format!("/api/grids/{}", id);
    assert_eq!(send_json(&app, Method::GET, &uri, &[], None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn prize_split_over_hundred_is_rejected() {
    let app = test_app();
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/admin/grids/1/config",
        &admin(),
        Some(json!({ "prize_q1": "50", "prize_q2": "30", "prize_q3": "20", "prize_q4": "10" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, state) = send_json(
        &app,
        Method::POST,
        "/api/admin/grids/1/config",
        &admin(),
        Some(json!({ "name": "Super Bowl Squares", "squares_limit": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["grid"]["name"], "Super Bowl Squares");
    assert_eq!(state["grid"]["squares_limit"], 10);
}

#[tokio::test]
async fn bulk_paid_then_participants_show_paid() {
    let app = test_app();
    claim(&app, 1, 1, "a@example.com").await;
    claim(&app, 1, 2, "a@example.com").await;
    claim(&app, 1, 3, "b@example.com").await;

    let (status, report) = send_json(
        &app,
        Method::POST,
        "/api/admin/grids/1/participants/bulk-paid",
        &admin(),
        Some(json!({ "emails": ["A@example.com", "nobody@example.com"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["squares_updated"], 2);
    assert_eq!(report["unknown"], json!(["nobody@example.com"]));

    let (_, page) = send_json(
        &app,
        Method::GET,
        "/api/admin/grids/1/participants?unpaid_only=true",
        &admin(),
        None,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["participants"][0]["email"], "b@example.com");

    let (_, audit) = send_json(
        &app,
        Method::GET,
        "/api/admin/audit?action=bulk_mark_paid",
        &admin(),
        None,
    )
    .await;
    assert_eq!(audit["total"], 1);
}

#[tokio::test]
async fn live_scores_fall_back_to_cached_scores() {
    let app = test_app();
    let (status, body) = send_json(&app, Method::GET, "/api/grids/1/live", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_type"], "game_not_found");
    assert!(body["game"].is_null());
    assert!(body["cached_scores"].is_object());

    let (status, body) =
        send_json(&app, Method::POST, "/api/admin/grids/1/live/sync", &admin(), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_type"], "game_not_found");
}

#[tokio::test]
async fn my_squares_counts_claims() {
    let app = test_app();
    claim(&app, 5, 5, "fan@example.com").await;
    claim(&app, 5, 6, "fan@example.com").await;

    let (status, body) = send_json(
        &app,
        Method::GET,
        "/api/my-squares?email=Fan@Example.com&grid_id=1",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["total_across_grids"], 2);
}
