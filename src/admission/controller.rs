//! The admission gate: circuit breaker, then rate limit, then queue capacity.

use crate::admission::queue::{EndpointQueues, QueuePermit, QueueStatus};
use crate::admission::rate_limit::{RateDecision, RateLimiter};
use crate::core::config::AdmissionConfig;
use crate::memory::MemoryProbe;
use crate::metrics::PerformanceMonitor;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process health as seen by the circuit breaker.
///
/// Replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub cpu_usage_percent: f64,
    pub heap_used_mb: f64,
    pub active_connections: usize,
    pub avg_response_time_ms: f64,
    pub sampled_at: DateTime<Utc>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            cpu_usage_percent: 0.0,
            heap_used_mb: 0.0,
            active_connections: 0,
            avg_response_time_ms: 0.0,
            sampled_at: Utc::now(),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Circuit breaker open
    Overloaded,
    RateLimited,
    QueueFull,
}

impl Rejection {
    /// Fixed wait hint handed back to the caller
    pub fn retry_after(&self) -> Duration {
        match self {
            Rejection::Overloaded => Duration::from_secs(30),
            Rejection::RateLimited => Duration::from_secs(60),
            Rejection::QueueFull => Duration::from_secs(10),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::Overloaded => "Server is overloaded, please retry later",
            Rejection::RateLimited => "Too many requests, please slow down",
            Rejection::QueueFull => "Server is busy, request queue is full",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Default)]
struct AdmissionCounters {
    admitted: AtomicU64,
    overloaded: AtomicU64,
    rate_limited: AtomicU64,
    queue_full: AtomicU64,
}

/// Admission outcome totals since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionTotals {
    pub admitted: u64,
    pub rejected_overloaded: u64,
    pub rejected_rate_limited: u64,
    pub rejected_queue_full: u64,
}

/// View served to load balancers and the health aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSnapshot {
    pub health: HealthSnapshot,
    pub circuit_open: bool,
    pub total_in_flight: usize,
    pub queues: BTreeMap<String, QueueStatus>,
    pub tracked_identities: usize,
    pub totals: AdmissionTotals,
}

/// Decides whether a request may run.
pub struct AdmissionController {
    rate_limiter: RateLimiter,
    queues: Arc<EndpointQueues>,
    snapshot: ArcSwap<HealthSnapshot>,
    probe: Arc<dyn MemoryProbe>,
    monitor: Arc<PerformanceMonitor>,
    config: AdmissionConfig,
    counters: AdmissionCounters,
    /// Breaker state seen by the last check, for transition logging
    circuit_open: AtomicBool,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, probe: Arc<dyn MemoryProbe>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            queues: Arc::new(EndpointQueues::new(config.queues.clone())),
            snapshot: ArcSwap::from_pointee(HealthSnapshot::default()),
            probe,
            monitor,
            config,
            counters: AdmissionCounters::default(),
            circuit_open: AtomicBool::new(false),
        }
    }

    /// Run the full gate for one request.
    ///
    /// The returned permit holds the endpoint's queue slot until dropped.
    pub fn admit(&self, identity: &str, endpoint: &str) -> Result<QueuePermit, Rejection> {
        self.update_server_health();

        if self.should_reject_request() {
            self.counters.overloaded.fetch_add(1, Ordering::Relaxed);
            return Err(Rejection::Overloaded);
        }

        if let RateDecision::Deny { retry_after } = self.rate_limiter.check_path(identity, endpoint) {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(identity, endpoint, window_resets_in = ?retry_after, "Rate limit exceeded");
            return Err(Rejection::RateLimited);
        }

        if !self.queue_request(endpoint) {
            self.counters.queue_full.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint,
                capacity = self.queues.capacity_for(endpoint),
                "Endpoint queue full"
            );
            return Err(Rejection::QueueFull);
        }

        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(QueuePermit::new(Arc::clone(&self.queues), endpoint.to_string()))
    }

    /// Count a request from `identity` against an explicit limit
    pub fn rate_limit(&self, identity: &str, max_requests: u32, window: Duration) -> RateDecision {
        self.rate_limiter.check(identity, max_requests, window)
    }

    /// Take a slot on `endpoint`; pair with [`Self::release_request`]
    pub fn queue_request(&self, endpoint: &str) -> bool {
        self.queues.try_acquire(endpoint)
    }

    pub fn release_request(&self, endpoint: &str) {
        self.queues.release(endpoint);
    }

    /// Circuit breaker against the latest snapshot
    pub fn should_reject_request(&self) -> bool {
        let snapshot = self.snapshot.load();
        let limits = &self.config.circuit_breaker;

        let open = snapshot.heap_used_mb > limits.max_heap_mb
            || snapshot.active_connections > limits.max_active_connections;
        if self.circuit_open.swap(open, Ordering::Relaxed) != open {
            if open {
                tracing::warn!(
                    heap_mb = snapshot.heap_used_mb,
                    active_connections = snapshot.active_connections,
                    "Circuit breaker open, shedding load"
                );
            } else {
                tracing::info!(
                    heap_mb = snapshot.heap_used_mb,
                    active_connections = snapshot.active_connections,
                    "Circuit breaker closed"
                );
            }
        }
        open
    }

    /// Recompute the snapshot from process counters and queue totals
    pub fn update_server_health(&self) {
        let reading = self.probe.read();
        self.snapshot.store(Arc::new(HealthSnapshot {
            cpu_usage_percent: reading.cpu_usage_percent,
            heap_used_mb: reading.usage.heap_used_mb,
            active_connections: self.queues.total_in_flight(),
            avg_response_time_ms: self.monitor.average_response_time_ms(),
            sampled_at: Utc::now(),
        }));
    }

    pub fn health_snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    /// Drop rate limit entries idle past the configured age
    pub fn sweep_rate_limits(&self) -> usize {
        let removed = self.rate_limiter.sweep();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.rate_limiter.len(), "Swept idle rate limit entries");
        }
        removed
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> LoadBalancerSnapshot {
        let health = (*self.snapshot.load_full()).clone();
        let limits = &self.config.circuit_breaker;
        let circuit_open =
            health.heap_used_mb > limits.max_heap_mb || health.active_connections > limits.max_active_connections;

        LoadBalancerSnapshot {
            circuit_open,
            total_in_flight: self.queues.total_in_flight(),
            queues: self.queues.statuses(),
            tracked_identities: self.rate_limiter.len(),
            totals: AdmissionTotals {
                admitted: self.counters.admitted.load(Ordering::Relaxed),
                rejected_overloaded: self.counters.overloaded.load(Ordering::Relaxed),
                rejected_rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
                rejected_queue_full: self.counters.queue_full.load(Ordering::Relaxed),
            },
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CircuitBreakerConfig, MetricsConfig, QueueConfig, QueueRule};
    use crate::memory::{ManualMemoryProbe, MemoryUsage, ProbeReading};

    fn controller(probe: Arc<ManualMemoryProbe>, config: AdmissionConfig) -> AdmissionController {
        let monitor = Arc::new(PerformanceMonitor::new(MetricsConfig::default()));
        AdmissionController::new(config, probe, monitor)
    }

    fn small_queues() -> AdmissionConfig {
        AdmissionConfig {
            queues: QueueConfig {
                default_capacity: 1,
                rules: vec![QueueRule {
                    pattern: "/feed".to_string(),
                    capacity: 2,
                }],
            },
            ..AdmissionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_and_release() {
        let admission = controller(Arc::new(ManualMemoryProbe::new(100.0)), small_queues());

        let first = admission.admit("ip-1", "/profile").unwrap();
        assert_eq!(admission.admit("ip-2", "/profile").unwrap_err(), Rejection::QueueFull);

        drop(first);
        assert!(admission.admit("ip-2", "/profile").is_ok());

        let totals = admission.snapshot().totals;
        assert_eq!(totals.admitted, 2);
        assert_eq!(totals.rejected_queue_full, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_runs_first() {
        let probe = Arc::new(ManualMemoryProbe::new(100.0));
        let admission = controller(
            Arc::clone(&probe),
            AdmissionConfig {
                circuit_breaker: CircuitBreakerConfig {
                    max_heap_mb: 500.0,
                    max_active_connections: 10,
                },
                ..AdmissionConfig::default()
            },
        );
        assert!(admission.admit("ip-1", "/feed").is_ok());

        probe.set_heap_mb(750.0);
        assert_eq!(admission.admit("ip-1", "/feed").unwrap_err(), Rejection::Overloaded);
        assert_eq!(admission.admit("ip-2", "/feed").unwrap_err(), Rejection::Overloaded);
        assert!(admission.snapshot().circuit_open);
        assert!(admission.circuit_open.load(Ordering::Relaxed));

        probe.set_heap_mb(200.0);
        assert!(admission.admit("ip-1", "/feed").is_ok());
        assert!(!admission.circuit_open.load(Ordering::Relaxed));
    }

    /// Counts how readings are taken.
    #[derive(Default)]
    struct CountingProbe {
        reads: AtomicU64,
        separate_calls: AtomicU64,
    }

    impl MemoryProbe for CountingProbe {
        fn read(&self) -> ProbeReading {
            self.reads.fetch_add(1, Ordering::SeqCst);
            ProbeReading {
                usage: MemoryUsage {
                    heap_used_mb: 64.0,
                    rss_mb: 64.0,
                    virtual_mb: 128.0,
                },
                cpu_usage_percent: 12.5,
            }
        }

        fn usage(&self) -> MemoryUsage {
            self.separate_calls.fetch_add(1, Ordering::SeqCst);
            MemoryUsage::default()
        }

        fn cpu_usage_percent(&self) -> f64 {
            self.separate_calls.fetch_add(1, Ordering::SeqCst);
            0.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_refresh_takes_one_reading() {
        let probe = Arc::new(CountingProbe::default());
        let monitor = Arc::new(PerformanceMonitor::new(MetricsConfig::default()));
        let admission = AdmissionController::new(AdmissionConfig::default(), Arc::clone(&probe) as Arc<dyn MemoryProbe>, monitor);

        admission.update_server_health();
        assert_eq!(probe.reads.load(Ordering::SeqCst), 1);
        assert_eq!(probe.separate_calls.load(Ordering::SeqCst), 0);

        let snapshot = admission.health_snapshot();
        assert_eq!(snapshot.heap_used_mb, 64.0);
        assert_eq!(snapshot.cpu_usage_percent, 12.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_connections_trip_breaker() {
        let admission = controller(
            Arc::new(ManualMemoryProbe::new(100.0)),
            AdmissionConfig {
                circuit_breaker: CircuitBreakerConfig {
                    max_heap_mb: 1024.0,
                    max_active_connections: 1,
                },
                ..AdmissionConfig::default()
            },
        );

        let _a = admission.admit("ip-1", "/feed").unwrap();
        let _b = admission.admit("ip-2", "/feed").unwrap();
        assert_eq!(admission.admit("ip-3", "/feed").unwrap_err(), Rejection::Overloaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rejection() {
        let mut config = AdmissionConfig::default();
        config.rate_limit.max_requests = 2;
        config.rate_limit.rules.clear();
        let admission = controller(Arc::new(ManualMemoryProbe::new(100.0)), config);

        assert!(admission.admit("ip-1", "/posts").is_ok());
        assert!(admission.admit("ip-1", "/posts").is_ok());
        assert_eq!(admission.admit("ip-1", "/posts").unwrap_err(), Rejection::RateLimited);
        assert_eq!(admission.snapshot().totals.rejected_rate_limited, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_counts_in_flight() {
        let admission = controller(Arc::new(ManualMemoryProbe::new(100.0)), small_queues());
        assert!(admission.queue_request("/feed"));
        assert!(admission.queue_request("/feed"));
        admission.update_server_health();

        assert_eq!(admission.health_snapshot().active_connections, 2);
        let snapshot = admission.snapshot();
        assert_eq!(snapshot.queues["/feed"], QueueStatus { in_flight: 2, capacity: 2 });

        admission.release_request("/feed");
        admission.release_request("/feed");
        admission.release_request("/feed");
        assert_eq!(admission.snapshot().total_in_flight, 0);
    }

    #[test]
    fn test_retry_hints() {
        assert_eq!(Rejection::Overloaded.retry_after(), Duration::from_secs(30));
        assert_eq!(Rejection::RateLimited.retry_after(), Duration::from_secs(60));
        assert_eq!(Rejection::QueueFull.retry_after(), Duration::from_secs(10));
    }
}
