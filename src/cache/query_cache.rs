//! TTL-based memoization of query results.
//!
//! Entries are checked for freshness on read and purged by the periodic
//! sweep. A producer failure is propagated to the caller and never stored.

use crate::cache::pagination::{CursorKey, Page};
use crate::cache::store::{Transaction, TransactionalStore};
use crate::core::config::CacheConfig;
use crate::core::Result;
use crate::metrics::{BoundedRing, PerformanceMonitor};
use dashmap::DashMap;
use futures::future::{try_join_all, BoxFuture};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) < self.ttl
    }
}

/// One recorded query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetric {
    pub key: String,
    pub duration_ms: f64,
    pub from_cache: bool,
}

/// Summary served by the query optimization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub total_queries: usize,
    pub cached_queries: usize,
    pub cache_hit_rate: f64,
    pub avg_execution_time_ms: f64,
    pub slow_queries: usize,
    pub cached_entries: usize,
    pub recommendations: Vec<String>,
}

/// Query result cache plus execution metrics.
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    metrics: Mutex<BoundedRing<QueryMetric>>,
    monitor: Option<Arc<PerformanceMonitor>>,
    config: CacheConfig,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            metrics: Mutex::new(BoundedRing::new(config.max_metrics)),
            monitor: None,
            config,
        }
    }

    /// Report query timings and hit/miss counts to the performance monitor.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached value for `key` if it is younger than its TTL,
    /// otherwise run `producer` and cache its successful result.
    pub async fn cached_query<T, E, F, Fut>(&self, key: &str, producer: F, ttl: Duration) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.lookup(key) {
            self.record(key, 0.0, Access::Hit);
            return Ok(value);
        }

        let started = Instant::now();
        let value = producer().await?;
        self.record(key, elapsed_ms(started), Access::Miss);

        match serde_json::to_value(&value) {
            Ok(json) => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: json,
                        cached_at: Instant::now(),
                        ttl,
                    },
                );
            },
            Err(e) => tracing::warn!(key, error = %e, "Query result is not cacheable"),
        }

        Ok(value)
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if !entry.is_fresh(Instant::now()) {
            return None;
        }
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "Cached value has a different shape, treating as miss");
                None
            },
        }
    }

    /// Run independent queries concurrently; the first failure fails the batch.
    ///
    /// One aggregate duration is recorded for the whole batch.
    pub async fn batch_query<T, E, I, Fut>(&self, queries: I) -> std::result::Result<Vec<T>, E>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let queries: Vec<Fut> = queries.into_iter().collect();
        let count = queries.len();
        let started = Instant::now();

        let results = try_join_all(queries).await;
        self.record(&format!("batch[{}]", count), elapsed_ms(started), Access::Bypass);
        results
    }

    /// Fetch `limit + 1` rows after `cursor` and trim to `limit`.
    ///
    /// `base_query` receives the cursor and the number of rows to fetch and
    /// must return rows in ascending key order. A zero `limit` is an empty,
    /// final page and runs no query.
    pub async fn paginated_query<R, E, F, Fut>(
        &self,
        base_query: F,
        cursor: Option<&str>,
        limit: usize,
    ) -> std::result::Result<Page<R>, E>
    where
        R: CursorKey,
        F: FnOnce(Option<String>, usize) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<R>, E>>,
    {
        if limit == 0 {
            return Ok(Page::from_overfetch(Vec::new(), 0));
        }

        let started = Instant::now();
        let rows = base_query(cursor.map(str::to_string), limit.saturating_add(1)).await?;
        self.record("paginated", elapsed_ms(started), Access::Bypass);
        Ok(Page::from_overfetch(rows, limit))
    }

    /// Run `callback` inside a transaction: commit on success, roll back on
    /// failure and return the original error.
    pub async fn with_transaction<S, T, F>(&self, store: &S, callback: F) -> Result<T>
    where
        S: TransactionalStore,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>>,
    {
        let started = Instant::now();
        let mut tx = store.begin().await?;

        let outcome = match callback(&mut tx).await {
            Ok(value) => tx.commit().await.map(|()| value),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                tracing::debug!(error = %e, "Transaction rolled back");
                Err(e)
            },
        };

        self.record("transaction", elapsed_ms(started), Access::Bypass);
        outcome
    }

    /// Drop entries older than their TTL, returning how many were removed
    pub fn clear_expired_cache(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired query cache entries");
        }
        removed
    }

    pub fn clear_all_caches(&self) {
        self.entries.clear();
        tracing::info!("Cleared query cache");
    }

    pub fn optimization_report(&self) -> OptimizationReport {
        let metrics = self.metrics.lock();
        let total = metrics.len();
        let cached = metrics.iter().filter(|m| m.from_cache).count();

        let executed: Vec<f64> = metrics
            .iter()
            .filter(|m| !m.from_cache)
            .map(|m| m.duration_ms)
            .collect();
        let avg_execution = if executed.is_empty() {
            0.0
        } else {
            executed.iter().sum::<f64>() / executed.len() as f64
        };
        let slow = executed
            .iter()
            .filter(|&&ms| ms > self.config.slow_query_ms)
            .count();
        drop(metrics);

        let hit_rate = if total == 0 {
            0.0
        } else {
            cached as f64 / total as f64
        };

        let mut recommendations = Vec::new();
        if total > 0 && hit_rate < 0.5 {
            recommendations.push("Increase caching for frequently read data".to_string());
        }
        if avg_execution > self.config.slow_query_ms {
            recommendations.push("Optimize slow queries: add indexes or narrow the selected columns".to_string());
        }
        if slow > 0 {
            recommendations.push(format!(
                "{} queries exceeded {}ms; review their query plans",
                slow, self.config.slow_query_ms
            ));
        }
        if recommendations.is_empty() {
            recommendations.push("Query performance is within targets".to_string());
        }

        OptimizationReport {
            total_queries: total,
            cached_queries: cached,
            cache_hit_rate: hit_rate,
            avg_execution_time_ms: avg_execution,
            slow_queries: slow,
            cached_entries: self.entries.len(),
            recommendations,
        }
    }

    fn record(&self, key: &str, duration_ms: f64, access: Access) {
        let from_cache = access == Access::Hit;
        self.metrics.lock().push(QueryMetric {
            key: key.to_string(),
            duration_ms,
            from_cache,
        });

        if let Some(monitor) = &self.monitor {
            match access {
                Access::Hit => monitor.track_cache_access(true),
                Access::Miss => {
                    monitor.track_cache_access(false);
                    monitor.track_db_query(duration_ms);
                },
                Access::Bypass => monitor.track_db_query(duration_ms),
            }
        }
    }
}

/// How a recorded query related to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Hit,
    Miss,
    /// Executed without a cache lookup; never counts toward the hit rate
    Bypass,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
