//! Main application context for feedguard.

use crate::admission::{admission_middleware, AdmissionController};
use crate::api;
use crate::cache::QueryCache;
use crate::core::{Config, GuardError, Result};
use crate::health::{CacheServiceHandle, DatabaseProbe, HealthAggregator, TcpDatabaseProbe};
use crate::memory::{MemoryManager, MemoryProbe, ProcessMemoryProbe};
use crate::metrics::PerformanceMonitor;
use crate::scheduler::{PeriodicTask, Scheduler, SchedulerHandle};
use axum::{middleware, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Every long-lived component, constructed once at startup and shared by
/// handle with request paths and background tasks.
#[derive(Clone)]
pub struct Application {
    /// Request, query and memory metrics
    monitor: Arc<PerformanceMonitor>,
    /// Object pools and memory pressure handling
    memory: Arc<MemoryManager>,
    /// Query result cache
    query_cache: Arc<QueryCache>,
    /// Admission gate
    admission: Arc<AdmissionController>,
    /// Health verdicts and capacity projection
    health: Arc<HealthAggregator>,
    /// Application configuration
    config: Arc<Config>,
}

impl Application {
    /// Create the application with the process memory probe.
    pub fn new(config: Config) -> Result<Self> {
        let database = TcpDatabaseProbe::from_config(&config.database, config.health.probe_timeout)
            .map(|probe| Arc::new(probe) as Arc<dyn DatabaseProbe>);
        let cache_service = CacheServiceHandle::from_mode(config.cache_service.mode);
        Self::with_components(config, Arc::new(ProcessMemoryProbe::new()), database, cache_service)
    }

    /// Create the application with explicit collaborators.
    pub fn with_components(
        config: Config,
        probe: Arc<dyn MemoryProbe>,
        database: Option<Arc<dyn DatabaseProbe>>,
        cache_service: CacheServiceHandle,
    ) -> Result<Self> {
        config.validate()?;

        let monitor = Arc::new(PerformanceMonitor::new(config.metrics.clone()));
        let memory = Arc::new(MemoryManager::new(config.memory.clone(), Arc::clone(&probe)));
        let query_cache = Arc::new(QueryCache::new(config.cache.clone()).with_monitor(Arc::clone(&monitor)));
        let admission = Arc::new(AdmissionController::new(
            config.admission.clone(),
            probe,
            Arc::clone(&monitor),
        ));
        let health = Arc::new(HealthAggregator::new(
            config.health.clone(),
            database,
            cache_service,
            Arc::clone(&memory),
            Arc::clone(&monitor),
            Arc::clone(&admission),
        ));

        Ok(Self {
            monitor,
            memory,
            query_cache,
            admission,
            health,
            config: Arc::new(config),
        })
    }

    /// Health and diagnostic routes.
    pub fn router(&self) -> Router {
        api::router(self.clone())
    }

    /// Wrap application routes with the admission gate.
    pub fn protect(&self, routes: Router) -> Router {
        routes.route_layer(middleware::from_fn_with_state(
            Arc::clone(&self.admission),
            admission_middleware,
        ))
    }

    /// The background schedule: health refresh, memory sampling and
    /// monitoring, cache and rate limit sweeps, and the periodic report.
    pub fn scheduler(&self) -> Scheduler {
        let admission = Arc::clone(&self.admission);
        let health_refresh = PeriodicTask::new(
            "health-refresh",
            self.config.admission.health_refresh_interval,
            move || {
                let admission = Arc::clone(&admission);
                async move {
                    admission.update_server_health();
                    Ok(())
                }
            },
        );

        let (monitor, memory) = (Arc::clone(&self.monitor), Arc::clone(&self.memory));
        let memory_sample = PeriodicTask::new("memory-sample", self.config.metrics.sample_interval, move || {
            let (monitor, memory) = (Arc::clone(&monitor), Arc::clone(&memory));
            async move {
                monitor.record_memory_usage(memory.usage().heap_used_mb);
                Ok(())
            }
        });

        let memory = Arc::clone(&self.memory);
        let memory_monitor = PeriodicTask::new("memory-monitor", self.config.memory.monitor_interval, move || {
            let memory = Arc::clone(&memory);
            async move {
                let outcome = memory.monitor_memory();
                tracing::debug!(heap_mb = outcome.heap_used_mb, "Memory monitor pass");
                Ok(())
            }
        });

        let (cache, admission) = (Arc::clone(&self.query_cache), Arc::clone(&self.admission));
        let sweep = PeriodicTask::new("cache-sweep", self.config.cache.sweep_interval, move || {
            let (cache, admission) = (Arc::clone(&cache), Arc::clone(&admission));
            async move {
                let expired = cache.clear_expired_cache();
                let idle = admission.sweep_rate_limits();
                tracing::debug!(expired, idle_identities = idle, "Sweep complete");
                Ok(())
            }
        });

        let monitor = Arc::clone(&self.monitor);
        let rotate = self.config.metrics.rotate_reports;
        let report = PeriodicTask::new("performance-report", self.config.metrics.report_interval, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                let report = monitor.performance_report();
                let summary = serde_json::to_string(&report.requests)?;
                tracing::info!(
                    status = %report.status,
                    issues = report.issues.len(),
                    requests = %summary,
                    avg_query_ms = report.database.avg_query_time_ms,
                    "Performance report"
                );
                if rotate {
                    monitor.reset();
                }
                Ok::<(), GuardError>(())
            }
        });

        Scheduler::new()
            .with_task(health_refresh)
            .with_task(memory_sample)
            .with_task(memory_monitor)
            .with_task(sweep)
            .with_task(report)
    }

    /// Serve the diagnostic router until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::new(self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GuardError::network(format!("Failed to bind to {}: {}", addr, e)))?;
        tracing::info!("Serving health endpoints on http://{}", addr);

        let schedule: SchedulerHandle = self.scheduler().start();
        let app = self.router();

        let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GuardError::network(format!("HTTP server error: {}", e)));

        schedule.shutdown().await;
        tracing::info!("feedguard stopped");
        served
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn query_cache(&self) -> &Arc<QueryCache> {
        &self.query_cache
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
