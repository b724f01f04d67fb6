//! Single health verdict from every component.
//!
//! Each call polls the database, the cache service, the memory manager, the
//! performance monitor and the admission controller concurrently. Probe
//! failures become component verdicts; the report itself is always produced.

use crate::admission::AdmissionController;
use crate::core::config::{HealthConfig, ScalabilityConfig};
use crate::core::{ComponentHealth, HealthStatus};
use crate::health::probes::{CacheServiceHandle, DatabaseProbe};
use crate::health::scalability::{assess, BottleneckLimits, CapacityInputs, ScalabilityAssessment};
use crate::memory::{MemoryManager, MemoryStats};
use crate::metrics::{PerformanceMonitor, PerformanceReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Error rate above which a bottleneck is reported
const MAX_ERROR_RATE: f64 = 0.05;

const CACHE_PROBE_KEY: &str = "feedguard:health:probe";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
    pub memory: ComponentHealth,
    pub performance: ComponentHealth,
    pub load_balancer: ComponentHealth,
}

impl HealthComponents {
    pub fn overall(&self) -> HealthStatus {
        HealthStatus::worst(
            [
                &self.database,
                &self.cache,
                &self.memory,
                &self.performance,
                &self.load_balancer,
            ]
            .into_iter()
            .map(|component| component.status),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub requests: u64,
    pub errors: u64,
    pub response_time_ms: f64,
    /// Requests per minute
    pub throughput: f64,
}

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
    pub scalability: ScalabilityAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityOverview {
    pub current_users: usize,
    pub max_capacity: u64,
    pub utilization_percent: f64,
}

/// Body of the scalability report endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalabilityReport {
    pub overview: CapacityOverview,
    pub performance: PerformanceReport,
    pub memory: MemoryStats,
    pub recommendations: Vec<String>,
    pub bottlenecks: Vec<String>,
    pub config: ScalabilityConfig,
}

/// Polls every component and combines their verdicts.
pub struct HealthAggregator {
    database: Option<Arc<dyn DatabaseProbe>>,
    cache_service: CacheServiceHandle,
    memory: Arc<MemoryManager>,
    monitor: Arc<PerformanceMonitor>,
    admission: Arc<AdmissionController>,
    config: HealthConfig,
    started_at: Instant,
    last_status: Mutex<Option<HealthStatus>>,
}

impl HealthAggregator {
    pub fn new(
        config: HealthConfig,
        database: Option<Arc<dyn DatabaseProbe>>,
        cache_service: CacheServiceHandle,
        memory: Arc<MemoryManager>,
        monitor: Arc<PerformanceMonitor>,
        admission: Arc<AdmissionController>,
    ) -> Self {
        Self {
            database,
            cache_service,
            memory,
            monitor,
            admission,
            config,
            started_at: Instant::now(),
            last_status: Mutex::new(None),
        }
    }

    /// Poll every component. Reads only; see [`Self::note_status`].
    pub async fn check(&self) -> HealthReport {
        let (database, cache, memory, (performance, report), load_balancer) = tokio::join!(
            self.check_database(),
            self.check_cache(),
            async { self.check_memory() },
            async { self.check_performance() },
            async { self.check_load_balancer() },
        );

        let components = HealthComponents {
            database,
            cache,
            memory,
            performance,
            load_balancer,
        };
        let status = components.overall();

        HealthReport {
            status,
            timestamp: Utc::now(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            metrics: HealthMetrics {
                requests: report.requests.total,
                errors: report.requests.errors,
                response_time_ms: report.requests.avg_response_time_ms,
                throughput: report.requests.requests_per_minute,
            },
            scalability: self.assess(&report),
            components,
        }
    }

    /// Operator view: capacity overview plus raw performance and memory figures
    pub fn scalability_report(&self) -> ScalabilityReport {
        let performance = self.monitor.performance_report();
        let assessment = self.assess(&performance);
        let current_users = self.admission.health_snapshot().active_connections;
        let utilization_percent = if assessment.max_users_estimate == 0 {
            100.0
        } else {
            current_users as f64 / assessment.max_users_estimate as f64 * 100.0
        };

        ScalabilityReport {
            overview: CapacityOverview {
                current_users,
                max_capacity: assessment.max_users_estimate,
                utilization_percent,
            },
            performance,
            memory: self.memory.memory_stats(),
            recommendations: assessment.recommendations,
            bottlenecks: assessment.bottlenecks,
            config: self.config.scalability.clone(),
        }
    }

    fn assess(&self, report: &PerformanceReport) -> ScalabilityAssessment {
        let inputs = CapacityInputs {
            heap_used_mb: self.memory.usage().heap_used_mb,
            avg_query_ms: (report.database.query_count > 0).then_some(report.database.avg_query_time_ms),
            db_pool_size: self.database.as_ref().map_or(1, |db| db.pool_size()),
            requests_per_minute: report.requests.requests_per_minute,
            error_rate: report.requests.error_rate,
        };
        let limits = BottleneckLimits {
            memory_warning_mb: self.config.memory_warning_mb,
            query_slow_ms: self.config.database_slow_ms,
            max_error_rate: MAX_ERROR_RATE,
        };
        assess(&inputs, &self.config.scalability, &limits)
    }

    async fn check_database(&self) -> ComponentHealth {
        let Some(database) = &self.database else {
            return ComponentHealth::degraded("Database probe not configured");
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.probe_timeout, database.ping()).await;
        let elapsed_ms = elapsed_ms(started);
        let details = json!({ "poolSize": database.pool_size() });

        let health = match outcome {
            Ok(Ok(())) if elapsed_ms > self.config.database_slow_ms => {
                ComponentHealth::degraded(format!("Database responding slowly ({:.0}ms)", elapsed_ms))
            },
            Ok(Ok(())) => ComponentHealth::healthy("Database connection is healthy"),
            Ok(Err(e)) => ComponentHealth::unhealthy(format!("Database unreachable: {}", e)),
            Err(_) => ComponentHealth::unhealthy(timeout_message("Database", self.config.probe_timeout)),
        };
        health.with_response_time(elapsed_ms).with_details(details)
    }

    async fn check_cache(&self) -> ComponentHealth {
        let service = match &self.cache_service {
            CacheServiceHandle::Present(service) => Arc::clone(service),
            CacheServiceHandle::Absent => return ComponentHealth::degraded("Cache service not configured"),
        };

        let started = Instant::now();
        let roundtrip = async {
            service.ping().await?;
            let stamp = Utc::now().timestamp_millis().to_string();
            service
                .set(CACHE_PROBE_KEY, stamp.clone(), Some(Duration::from_secs(10)))
                .await?;
            let read_back = service.get(CACHE_PROBE_KEY).await?;
            Ok::<bool, crate::core::GuardError>(read_back.as_deref() == Some(stamp.as_str()))
        };
        let outcome = tokio::time::timeout(self.config.probe_timeout, roundtrip).await;
        let elapsed_ms = elapsed_ms(started);

        let health = match outcome {
            Ok(Ok(true)) => ComponentHealth::healthy("Cache service is healthy"),
            Ok(Ok(false)) => ComponentHealth::degraded("Cache service returned a stale value"),
            Ok(Err(e)) => ComponentHealth::degraded(format!("Cache service unavailable: {}", e)),
            Err(_) => ComponentHealth::degraded(timeout_message("Cache service", self.config.probe_timeout)),
        };
        health.with_response_time(elapsed_ms)
    }

    fn check_memory(&self) -> ComponentHealth {
        let stats = self.memory.memory_stats();
        let heap = stats.usage.heap_used_mb;
        let details = json!({
            "heapUsedMb": heap,
            "rssMb": stats.usage.rss_mb,
            "pools": stats.pools.len(),
            "gcRuns": stats.gc_runs,
        });

        let health = if heap > self.config.memory_critical_mb {
            ComponentHealth::unhealthy(format!("Memory usage critical: {:.0}MB", heap))
        } else if heap > self.config.memory_warning_mb {
            ComponentHealth::degraded(format!("Memory usage high: {:.0}MB", heap))
        } else {
            ComponentHealth::healthy(format!("Memory usage normal: {:.0}MB", heap))
        };
        health.with_details(details)
    }

    fn check_performance(&self) -> (ComponentHealth, PerformanceReport) {
        let report = self.monitor.performance_report();
        let message = if report.issues.is_empty() {
            "Performance within thresholds".to_string()
        } else {
            report.issues.join("; ")
        };
        let details = json!({
            "errorRate": report.requests.error_rate,
            "avgQueryTimeMs": report.database.avg_query_time_ms,
            "cacheHitRate": report.cache.hit_rate,
        });

        let health = ComponentHealth::new(report.status, message)
            .with_response_time(report.requests.avg_response_time_ms)
            .with_details(details);
        (health, report)
    }

    fn check_load_balancer(&self) -> ComponentHealth {
        let snapshot = self.admission.snapshot();
        let details = json!({
            "activeConnections": snapshot.health.active_connections,
            "totalInFlight": snapshot.total_in_flight,
            "cpuUsagePercent": snapshot.health.cpu_usage_percent,
        });

        let saturated: Vec<&str> = snapshot
            .queues
            .iter()
            .filter(|(_, status)| status.utilization() >= self.config.queue_degraded_utilization)
            .map(|(endpoint, _)| endpoint.as_str())
            .collect();

        let health = if snapshot.circuit_open {
            ComponentHealth::unhealthy("Circuit breaker open, shedding load")
        } else if !saturated.is_empty() {
            ComponentHealth::degraded(format!("Queues near capacity: {}", saturated.join(", ")))
        } else {
            ComponentHealth::healthy("Accepting traffic")
        };
        health.with_details(details)
    }

    /// Log when the served status differs from the last one noted.
    ///
    /// Returns whether it changed.
    pub fn note_status(&self, status: HealthStatus) -> bool {
        let mut last = self.last_status.lock();
        if *last == Some(status) {
            return false;
        }
        match status {
            HealthStatus::Healthy => tracing::info!(from = ?*last, "Service healthy"),
            HealthStatus::Degraded => tracing::warn!(from = ?*last, "Service degraded"),
            HealthStatus::Unhealthy => tracing::error!(from = ?*last, "Service unhealthy"),
        }
        *last = Some(status);
        true
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn timeout_message(component: &str, timeout: Duration) -> String {
    format!("{} probe timed out after {}ms", component, timeout.as_millis())
}
