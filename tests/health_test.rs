//! Health aggregation across real components and fake dependencies.

mod common;

use common::{FailingCacheService, FakeDatabase, TestApp};
use pretty_assertions::assert_eq;
use feedguard_lib::core::HealthStatus;
use feedguard_lib::health::CacheServiceHandle;
use std::sync::Arc;

#[tokio::test]
async fn test_all_components_healthy() {
    let app = TestApp::new().build();
    let report = app.health().check().await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.components.database.status, HealthStatus::Healthy);
    assert_eq!(report.components.cache.status, HealthStatus::Healthy);
    assert_eq!(report.components.memory.status, HealthStatus::Healthy);
    assert_eq!(report.components.load_balancer.status, HealthStatus::Healthy);
    assert!(report.components.database.response_time_ms.is_some());
    assert!(report.scalability.max_users_estimate >= report.scalability.current_capacity_estimate);
}

#[tokio::test]
async fn test_unreachable_database_is_unhealthy() {
    let database = FakeDatabase::reachable();
    let app = TestApp::new().database(Some(database.clone())).build();
    assert_eq!(app.health().check().await.status, HealthStatus::Healthy);

    database.set_reachable(false);
    let report = app.health().check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.components.database.message.contains("connection refused"));

    database.set_reachable(true);
    assert_eq!(app.health().check().await.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_missing_dependencies_degrade() {
    let app = TestApp::new()
        .database(None)
        .cache_service(CacheServiceHandle::Absent)
        .build();
    let report = app.health().check().await;

    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.components.database.status, HealthStatus::Degraded);
    assert_eq!(report.components.cache.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_cache_failure_only_degrades() {
    let app = TestApp::new()
        .cache_service(CacheServiceHandle::Present(Arc::new(FailingCacheService)))
        .build();
    let report = app.health().check().await;

    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.components.cache.message.contains("connection reset"));
}

#[tokio::test]
async fn test_memory_thresholds() {
    let degraded = TestApp::new().heap_mb(800.0).build();
    let report = degraded.health().check().await;
    assert_eq!(report.components.memory.status, HealthStatus::Degraded);

    let critical = TestApp::new().heap_mb(950.0).build();
    let report = critical.health().check().await;
    assert_eq!(report.components.memory.status, HealthStatus::Unhealthy);
    assert_eq!(report.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_open_circuit_marks_load_balancer_unhealthy() {
    let app = TestApp::new().heap_mb(2000.0).build();
    app.admission().update_server_health();

    let report = app.health().check().await;
    assert_eq!(report.components.load_balancer.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_report_reflects_traffic() {
    let app = TestApp::new().build();
    app.monitor().track_request("/feed", 40.0);
    app.monitor().track_request("/feed", 60.0);
    app.monitor().track_error("/feed");

    let report = app.health().check().await;
    assert_eq!(report.metrics.requests, 2);
    assert_eq!(report.metrics.errors, 1);
    assert_eq!(report.metrics.response_time_ms, 50.0);
}

#[tokio::test]
async fn test_scalability_report() {
    let app = TestApp::new().build();
    let report = app.health().scalability_report();

    assert!(report.overview.max_capacity > 0);
    assert_eq!(report.overview.current_users, 0);
    assert_eq!(report.overview.utilization_percent, 0.0);
    assert_eq!(report.memory.usage.heap_used_mb, 100.0);
}
