#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use area_engine::{
    engine::{Engine, EngineConfig, EngineStores, TimerRegistry},
    handlers::admin_router,
    registry::ServiceRegistry,
    state::AppState,
    store::MemoryStore,
    types::{
        ApiErrorCode, ApiErrorResponse, CancelScheduledResponse, EngineStatusResponse,
        ListScheduledResponse,
    },
};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::AUTHORIZATION},
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    timers: TimerRegistry,
}

fn build_app(token: Option<&str>) -> TestApp {
    let timers = TimerRegistry::new();
    let engine = Engine::with_timers(
        EngineStores::shared(MemoryStore::new()),
        Arc::new(ServiceRegistry::new()),
        EngineConfig::default(),
        timers.clone(),
    );
    let state = AppState {
        engine: Arc::new(engine),
        admin_api_token: token.map(str::to_string),
    };

    TestApp {
        app: admin_router(state),
        timers,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn status_reports_outstanding_timers() {
    let test = build_app(None);
    test.timers
        .schedule("e-m-0".to_string(), Duration::from_secs(3600), async {});

    let response = test
        .app
        .oneshot(request(Method::GET, "/internal/engine/status", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: EngineStatusResponse = json_body(response).await;
    assert!(!body.running);
    assert_eq!(body.scheduled, 1);
}

#[tokio::test]
async fn list_scheduled_returns_soonest_first() {
    let test = build_app(None);
    test.timers
        .schedule("late".to_string(), Duration::from_secs(7200), async {});
    test.timers
        .schedule("soon".to_string(), Duration::from_secs(600), async {});

    let response = test
        .app
        .oneshot(request(Method::GET, "/internal/engine/scheduled", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ListScheduledResponse = json_body(response).await;
    let ids: Vec<&str> = body.reactions.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["soon", "late"]);
}

#[tokio::test]
async fn cancel_removes_the_timer() {
    let test = build_app(None);
    test.timers
        .schedule("e-m-1".to_string(), Duration::from_secs(3600), async {});

    let response = test
        .app
        .clone()
        .oneshot(request(Method::DELETE, "/internal/engine/scheduled/e-m-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: CancelScheduledResponse = json_body(response).await;
    assert_eq!(body.id, "e-m-1");
    assert!(body.cancelled);
    assert!(test.timers.is_empty());

    let again = test
        .app
        .oneshot(request(Method::DELETE, "/internal/engine/scheduled/e-m-1", None))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    let body: ApiErrorResponse = json_body(again).await;
    assert_eq!(body.code, ApiErrorCode::NotFound);
}

#[tokio::test]
async fn configured_token_is_required() {
    let test = build_app(Some("admin-secret"));

    let missing = test
        .app
        .clone()
        .oneshot(request(Method::GET, "/internal/engine/status", None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: ApiErrorResponse = json_body(missing).await;
    assert_eq!(body.code, ApiErrorCode::Unauthorized);

    let wrong = test
        .app
        .clone()
        .oneshot(request(Method::GET, "/internal/engine/status", Some("nope")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = test
        .app
        .oneshot(request(
            Method::GET,
            "/internal/engine/status",
            Some("admin-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn lowercase_bearer_scheme_is_accepted() {
    let test = build_app(Some("admin-secret"));

    let request = Request::builder()
        .uri("/internal/engine/scheduled")
        .header(AUTHORIZATION, "bearer admin-secret ")
        .body(Body::empty())
        .unwrap();
    let response = test.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
