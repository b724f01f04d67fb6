//! Admission gate behavior through the axum middleware.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use common::{json_body, TestApp};
use feedguard_lib::core::config::QueueRule;
use feedguard_lib::core::Config;
use feedguard_lib::Application;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

fn routes(app: &Application) -> Router {
    app.protect(
        Router::new()
            .route("/feed", get(|| async { "feed" }))
            .route("/auth/login", post(|| async { "token" }))
            .route(
                "/posts/:id",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            ),
    )
}

fn request(method: &str, uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_admitted_request_is_measured() {
    let app = TestApp::new().build();
    let router = routes(&app);

    let response = router.oneshot(request("GET", "/feed", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = app.monitor().performance_report();
    assert_eq!(report.endpoints["/feed"].request_count, 1);
    assert_eq!(report.requests.errors, 0);

    let snapshot = app.admission().snapshot();
    assert_eq!(snapshot.totals.admitted, 1);
    assert_eq!(snapshot.total_in_flight, 0);
}

#[tokio::test]
async fn test_server_errors_use_route_template() {
    let app = TestApp::new().build();
    let router = routes(&app);

    for id in ["1", "2"] {
        let response = router
            .clone()
            .oneshot(request("GET", &format!("/posts/{}", id), "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let report = app.monitor().performance_report();
    let posts = &report.endpoints["/posts/:id"];
    assert_eq!(posts.request_count, 2);
    assert_eq!(posts.error_count, 2);
}

#[tokio::test]
async fn test_auth_rate_limit() {
    let app = TestApp::new().build();
    let router = routes(&app);

    for _ in 0..10 {
        let response = router
            .clone()
            .oneshot(request("POST", "/auth/login", "10.0.0.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .clone()
        .oneshot(request("POST", "/auth/login", "10.0.0.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    let body = json_body(response).await;
    assert_eq!(body["retryAfterSeconds"], 60);

    // another caller has its own budget, and other routes are unaffected
    let other = router
        .clone()
        .oneshot(request("POST", "/auth/login", "10.0.0.8"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
    let feed = router.oneshot(request("GET", "/feed", "10.0.0.7")).await.unwrap();
    assert_eq!(feed.status(), StatusCode::OK);

    assert_eq!(app.admission().snapshot().totals.rejected_rate_limited, 1);
}

#[tokio::test]
async fn test_circuit_breaker_sheds_load() {
    let app = TestApp::new().heap_mb(2048.0).build();
    let router = routes(&app);

    let response = router.oneshot(request("GET", "/feed", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");

    let snapshot = app.admission().snapshot();
    assert!(snapshot.circuit_open);
    assert_eq!(snapshot.totals.rejected_overloaded, 1);
    assert!(app.monitor().performance_report().endpoints.is_empty());
}

#[tokio::test]
async fn test_queue_full_until_slot_released() {
    let mut config = Config::default();
    config.admission.queues.rules.insert(
        0,
        QueueRule {
            pattern: "/export".to_string(),
            capacity: 1,
        },
    );
    let app = TestApp::new().config(config).build();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handler = {
        let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
        move || {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            async move {
                entered.notify_one();
                release.notified().await;
                "exported"
            }
        }
    };
    let router = app.protect(Router::new().route("/export", get(handler)));

    let first = tokio::spawn(router.clone().oneshot(request("GET", "/export", "10.0.0.1")));
    entered.notified().await;
    assert_eq!(app.admission().snapshot().total_in_flight, 1);

    let second = router
        .clone()
        .oneshot(request("GET", "/export", "10.0.0.2"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(second.headers()[header::RETRY_AFTER], "10");

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(app.admission().snapshot().total_in_flight, 0);

    release.notify_one();
    let third = router.oneshot(request("GET", "/export", "10.0.0.2")).await.unwrap();
    assert_eq!(third.status(), StatusCode::OK);
}
