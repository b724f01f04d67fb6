//! HTTP endpoints for load balancers, dashboards and operators.
//!
//! - `GET /health`: aggregate health report; 503 when unhealthy
//! - `GET /health/scalability`: capacity overview for dashboards
//! - `GET /internal/performance`: raw performance report
//! - `GET /internal/load-balancer`: raw admission snapshot
//! - `GET /internal/memory`: raw memory stats
//! - `GET /internal/query-optimization`: raw query cache report

use crate::application::Application;
use crate::core::HealthStatus;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the diagnostic router.
pub fn router(app: Application) -> Router {
    let enable_cors = app.config().server.enable_cors;

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/health/scalability", get(scalability_handler))
        .route("/internal/performance", get(performance_handler))
        .route("/internal/load-balancer", get(load_balancer_handler))
        .route("/internal/memory", get(memory_handler))
        .route("/internal/query-optimization", get(query_optimization_handler))
        .with_state(app);

    if enable_cors {
        router = router.layer(ServiceBuilder::new().layer(CorsLayer::permissive()));
    }

    router.layer(TraceLayer::new_for_http())
}

/// GET /health - aggregate status, 503 only when unhealthy
async fn health_handler(State(app): State<Application>) -> impl IntoResponse {
    let report = app.health().check().await;
    app.health().note_status(report.status);
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}

/// GET /health/scalability
async fn scalability_handler(State(app): State<Application>) -> impl IntoResponse {
    Json(app.health().scalability_report())
}

/// GET /internal/performance
async fn performance_handler(State(app): State<Application>) -> impl IntoResponse {
    Json(app.monitor().performance_report())
}

/// GET /internal/load-balancer
async fn load_balancer_handler(State(app): State<Application>) -> impl IntoResponse {
    Json(app.admission().snapshot())
}

/// GET /internal/memory
async fn memory_handler(State(app): State<Application>) -> impl IntoResponse {
    Json(app.memory().memory_stats())
}

/// GET /internal/query-optimization
async fn query_optimization_handler(State(app): State<Application>) -> impl IntoResponse {
    Json(app.query_cache().optimization_report())
}
