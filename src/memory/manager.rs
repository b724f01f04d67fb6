//! Memory reclamation: named pools plus pressure-driven collection.

use crate::core::config::MemoryConfig;
use crate::core::{GuardError, Result};
use crate::memory::pool::{ErasedPool, ObjectPool, PoolKey, PoolStats, Pooled, ReleaseOutcome};
use crate::memory::probe::{MemoryProbe, MemoryUsage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Result of one forced collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub at: DateTime<Utc>,
    pub before_mb: f64,
    pub after_mb: f64,
    pub freed_mb: f64,
    pub duration_ms: f64,
}

/// Outcome of [`MemoryManager::force_garbage_collection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GcOutcome {
    /// The probe cannot force a collection
    Unsupported,
    Completed(GcReport),
}

/// What one pass of [`MemoryManager::monitor_memory`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOutcome {
    pub heap_used_mb: f64,
    pub gc: Option<GcOutcome>,
    pub pools_cleared: bool,
}

/// Snapshot served by the memory diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub usage: MemoryUsage,
    pub pools: BTreeMap<String, PoolStats>,
    pub last_gc: Option<GcReport>,
    pub gc_runs: u64,
    pub gc_high_water_mb: f64,
    pub gc_critical_mb: f64,
}

/// Owns the object pools and reacts to memory pressure.
pub struct MemoryManager {
    pools: Mutex<HashMap<String, Box<dyn ErasedPool>>>,
    probe: Arc<dyn MemoryProbe>,
    config: MemoryConfig,
    last_gc: Mutex<Option<GcReport>>,
    gc_runs: AtomicU64,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            probe,
            config,
            last_gc: Mutex::new(None),
            gc_runs: AtomicU64::new(0),
        }
    }

    /// Register a pool; re-registering a name replaces the previous pool.
    pub fn create_pool<T, F, R>(&self, key: PoolKey<T>, factory: F, reset: R, max_size: usize)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        let pool: Box<dyn ErasedPool> = Box::new(ObjectPool::new(factory, reset, max_size));
        if self.pools.lock().insert(key.name().to_string(), pool).is_some() {
            tracing::debug!(pool = key.name(), "Replaced existing object pool");
        }
    }

    /// Lend an object from the named pool
    pub fn acquire<T: Send + 'static>(&self, key: PoolKey<T>) -> Result<Pooled<T>> {
        let mut pools = self.pools.lock();
        let pool = pools
            .get_mut(key.name())
            .ok_or_else(|| GuardError::PoolNotFound(key.name().to_string()))?;
        let pool = pool
            .as_any_mut()
            .downcast_mut::<ObjectPool<T>>()
            .ok_or_else(|| GuardError::PoolTypeMismatch {
                name: key.name().to_string(),
            })?;
        Ok(pool.acquire())
    }

    /// Return an object; unknown pools and foreign objects are ignored
    pub fn release<T: Send + 'static>(&self, key: PoolKey<T>, pooled: Pooled<T>) -> ReleaseOutcome {
        let mut pools = self.pools.lock();
        match pools
            .get_mut(key.name())
            .and_then(|pool| pool.as_any_mut().downcast_mut::<ObjectPool<T>>())
        {
            Some(pool) => pool.release(pooled),
            None => ReleaseOutcome::Ignored,
        }
    }

    /// Empty every pool's available stack and in-use set
    pub fn clear_all_pools(&self) {
        let mut pools = self.pools.lock();
        for pool in pools.values_mut() {
            pool.clear();
        }
        tracing::warn!(pools = pools.len(), "Cleared all object pools");
    }

    /// Ask the probe for an immediate collection and measure the effect
    pub fn force_garbage_collection(&self) -> GcOutcome {
        let before = self.probe.usage().heap_used_mb;
        let started = Instant::now();

        if !self.probe.try_collect() {
            tracing::debug!("Forced collection not supported by memory probe");
            return GcOutcome::Unsupported;
        }

        let after = self.probe.usage().heap_used_mb;
        let report = GcReport {
            at: Utc::now(),
            before_mb: before,
            after_mb: after,
            freed_mb: before - after,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        self.gc_runs.fetch_add(1, Ordering::Relaxed);
        *self.last_gc.lock() = Some(report);

        if report.freed_mb > self.config.gc_noise_threshold_mb {
            tracing::info!(
                freed_mb = report.freed_mb,
                before_mb = before,
                after_mb = after,
                "Forced collection reclaimed memory"
            );
        }

        GcOutcome::Completed(report)
    }

    /// One pass of the periodic memory monitor
    pub fn monitor_memory(&self) -> MonitorOutcome {
        let heap = self.probe.usage().heap_used_mb;
        let mut outcome = MonitorOutcome {
            heap_used_mb: heap,
            gc: None,
            pools_cleared: false,
        };

        if heap > self.config.gc_high_water_mb {
            tracing::warn!(
                heap_mb = heap,
                high_water_mb = self.config.gc_high_water_mb,
                "Heap above high-water mark, forcing collection"
            );
            outcome.gc = Some(self.force_garbage_collection());
        }

        if heap > self.config.gc_critical_mb {
            tracing::error!(
                heap_mb = heap,
                critical_mb = self.config.gc_critical_mb,
                "Heap above critical mark, dropping pooled objects"
            );
            self.clear_all_pools();
            outcome.pools_cleared = true;
        }

        outcome
    }

    /// Current memory figures
    pub fn usage(&self) -> MemoryUsage {
        self.probe.usage()
    }

    /// Shared probe, also used by the admission controller
    pub fn probe(&self) -> &Arc<dyn MemoryProbe> {
        &self.probe
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let pools = self
            .pools
            .lock()
            .iter()
            .map(|(name, pool)| (name.clone(), pool.stats()))
            .collect();

        MemoryStats {
            usage: self.probe.usage(),
            pools,
            last_gc: *self.last_gc.lock(),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
            gc_high_water_mb: self.config.gc_high_water_mb,
            gc_critical_mb: self.config.gc_critical_mb,
        }
    }
}
