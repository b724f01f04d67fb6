//! Process-wide request, query and memory bookkeeping.
//!
//! Every operation is an in-memory append or read with a fixed bound;
//! overflow drops the oldest sample and never fails.

use crate::core::config::{MetricsConfig, PerformanceThresholds};
use crate::core::HealthStatus;
use crate::metrics::ring_buffer::BoundedRing;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Timestamped heap sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub heap_used_mb: f64,
}

#[derive(Debug)]
struct EndpointStats {
    latencies: BoundedRing<f64>,
    requests: u64,
    errors: u64,
}

impl EndpointStats {
    fn new(window: usize) -> Self {
        Self {
            latencies: BoundedRing::new(window),
            requests: 0,
            errors: 0,
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    endpoints: HashMap<String, EndpointStats>,
    db_queries: BoundedRing<f64>,
    memory_samples: BoundedRing<MemorySample>,
    cache_hits: u64,
    cache_misses: u64,
    started_at: Instant,
}

impl MonitorState {
    fn new(config: &MetricsConfig) -> Self {
        Self {
            endpoints: HashMap::new(),
            db_queries: BoundedRing::new(config.db_query_window),
            memory_samples: BoundedRing::new(config.memory_window),
            cache_hits: 0,
            cache_misses: 0,
            started_at: Instant::now(),
        }
    }

    fn endpoint(&mut self, endpoint: &str, window: usize) -> &mut EndpointStats {
        self.endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointStats::new(window))
    }
}

/// Metrics aggregator shared by every request path.
#[derive(Debug)]
pub struct PerformanceMonitor {
    state: RwLock<MonitorState>,
    config: MetricsConfig,
}

/// Per-endpoint slice of the performance report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointReport {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub requests_per_minute: f64,
}

/// Aggregate request totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub total: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub requests_per_minute: f64,
}

/// Database query timings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub query_count: usize,
    pub avg_query_time_ms: f64,
    pub max_query_time_ms: f64,
}

/// Current heap and its trend across the retained samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTrend {
    pub current_heap_mb: Option<f64>,
    /// Newest minus oldest retained sample
    pub trend_mb: f64,
    pub samples: Vec<MemorySample>,
}

/// Cache hit accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: Option<f64>,
}

/// Pure read of everything the monitor has accumulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub window_seconds: f64,
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub requests: RequestSummary,
    pub endpoints: BTreeMap<String, EndpointReport>,
    pub database: DatabaseSummary,
    pub memory: MemoryTrend,
    pub cache: CacheSummary,
}

impl PerformanceMonitor {
    /// Create a monitor with the given ring sizes and thresholds
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            state: RwLock::new(MonitorState::new(&config)),
            config,
        }
    }

    /// Record a completed request
    pub fn track_request(&self, endpoint: &str, duration_ms: f64) {
        let window = self.config.latency_window;
        let mut state = self.state.write();
        let stats = state.endpoint(endpoint, window);
        stats.latencies.push(duration_ms);
        stats.requests += 1;
    }

    /// Record a failed request
    pub fn track_error(&self, endpoint: &str) {
        let window = self.config.latency_window;
        self.state.write().endpoint(endpoint, window).errors += 1;
    }

    /// Record a database query duration
    pub fn track_db_query(&self, duration_ms: f64) {
        self.state.write().db_queries.push(duration_ms);
    }

    /// Record a cache lookup outcome
    pub fn track_cache_access(&self, hit: bool) {
        let mut state = self.state.write();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    /// Append a heap sample
    pub fn record_memory_usage(&self, heap_used_mb: f64) {
        self.state.write().memory_samples.push(MemorySample {
            timestamp: Utc::now(),
            heap_used_mb,
        });
    }

    /// Mean latency across every retained request sample
    pub fn average_response_time_ms(&self) -> f64 {
        let state = self.state.read();
        let (sum, count) = state
            .endpoints
            .values()
            .flat_map(|stats| stats.latencies.iter())
            .fold((0.0, 0usize), |(sum, count), latency| (sum + latency, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Compute the performance report
    pub fn performance_report(&self) -> PerformanceReport {
        let state = self.state.read();
        let elapsed_secs = state.started_at.elapsed().as_secs_f64();
        // at least one second so a fresh monitor does not divide by zero
        let elapsed_minutes = elapsed_secs.max(1.0) / 60.0;

        let mut endpoints = BTreeMap::new();
        let mut total_requests = 0;
        let mut total_errors = 0;
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;

        for (name, stats) in &state.endpoints {
            total_requests += stats.requests;
            total_errors += stats.errors;
            latency_sum += stats.latencies.iter().sum::<f64>();
            latency_count += stats.latencies.len();

            endpoints.insert(
                name.clone(),
                EndpointReport {
                    request_count: stats.requests,
                    error_count: stats.errors,
                    avg_response_time_ms: stats.latencies.mean().unwrap_or(0.0),
                    requests_per_minute: stats.requests as f64 / elapsed_minutes,
                },
            );
        }

        let requests = RequestSummary {
            total: total_requests,
            errors: total_errors,
            error_rate: if total_requests == 0 {
                0.0
            } else {
                total_errors as f64 / total_requests as f64
            },
            avg_response_time_ms: if latency_count == 0 {
                0.0
            } else {
                latency_sum / latency_count as f64
            },
            requests_per_minute: total_requests as f64 / elapsed_minutes,
        };

        let database = DatabaseSummary {
            query_count: state.db_queries.len(),
            avg_query_time_ms: state.db_queries.mean().unwrap_or(0.0),
            max_query_time_ms: state.db_queries.max().unwrap_or(0.0),
        };

        let current_heap_mb = state.memory_samples.last().map(|s| s.heap_used_mb);
        let trend_mb = match (state.memory_samples.first(), state.memory_samples.last()) {
            (Some(first), Some(last)) => last.heap_used_mb - first.heap_used_mb,
            _ => 0.0,
        };
        let memory = MemoryTrend {
            current_heap_mb,
            trend_mb,
            samples: state.memory_samples.iter().copied().collect(),
        };

        let lookups = state.cache_hits + state.cache_misses;
        let cache = CacheSummary {
            hits: state.cache_hits,
            misses: state.cache_misses,
            hit_rate: (lookups > 0).then(|| state.cache_hits as f64 / lookups as f64),
        };

        let (status, issues) =
            classify(&self.config.thresholds, current_heap_mb, &database, cache.hit_rate);

        PerformanceReport {
            generated_at: Utc::now(),
            window_seconds: elapsed_secs,
            status,
            issues,
            requests,
            endpoints,
            database,
            memory,
            cache,
        }
    }

    /// Clear every counter and ring; used for report rotation only
    pub fn reset(&self) {
        *self.state.write() = MonitorState::new(&self.config);
    }
}

/// Fixed-threshold classification of the report inputs.
fn classify(
    thresholds: &PerformanceThresholds,
    heap_mb: Option<f64>,
    database: &DatabaseSummary,
    cache_hit_rate: Option<f64>,
) -> (HealthStatus, Vec<String>) {
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();
    let avg_query = database.avg_query_time_ms;

    if let Some(heap) = heap_mb {
        if heap > thresholds.heap_critical_mb {
            status = status.max(HealthStatus::Unhealthy);
            issues.push(format!("Heap usage critical: {:.0}MB", heap));
        } else if heap > thresholds.heap_warning_mb {
            status = status.max(HealthStatus::Degraded);
            issues.push(format!("Heap usage high: {:.0}MB", heap));
        }
    }

    if avg_query > thresholds.query_critical_ms {
        status = status.max(HealthStatus::Unhealthy);
        issues.push(format!("Database queries critically slow: {:.1}ms average", avg_query));
    } else if avg_query > thresholds.query_warning_ms {
        status = status.max(HealthStatus::Degraded);
        issues.push(format!("Database queries slow: {:.1}ms average", avg_query));
    }

    if let Some(rate) = cache_hit_rate {
        if rate < thresholds.min_cache_hit_rate {
            status = status.max(HealthStatus::Degraded);
            issues.push(format!("Cache hit rate low: {:.0}%", rate * 100.0));
        }
    }

    (status, issues)
}
