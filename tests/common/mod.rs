//! Common test utilities and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use feedguard_lib::core::{Config, GuardError, Result};
use feedguard_lib::health::{CacheService, CacheServiceHandle, DatabaseProbe, EmbeddedCacheService};
use feedguard_lib::memory::ManualMemoryProbe;
use feedguard_lib::Application;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Database probe whose reachability is toggled by the test.
pub struct FakeDatabase {
    reachable: AtomicBool,
    pool_size: u32,
}

impl FakeDatabase {
    pub fn reachable() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            pool_size: 20,
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatabaseProbe for FakeDatabase {
    async fn ping(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GuardError::database("connection refused"))
        }
    }

    fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

/// Cache service that is deployed but refuses every call.
pub struct FailingCacheService;

#[async_trait]
impl CacheService for FailingCacheService {
    async fn ping(&self) -> Result<()> {
        Err(GuardError::cache_service("connection reset"))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(GuardError::cache_service("connection reset"))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> Result<()> {
        Err(GuardError::cache_service("connection reset"))
    }
}

/// Fixture builder for a fully wired application.
pub struct TestApp {
    config: Config,
    heap_mb: f64,
    database: Option<Arc<dyn DatabaseProbe>>,
    cache_service: CacheServiceHandle,
}

impl TestApp {
    /// Healthy defaults: reachable database, embedded cache, 100MB heap
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            heap_mb: 100.0,
            database: Some(FakeDatabase::reachable()),
            cache_service: CacheServiceHandle::Present(Arc::new(EmbeddedCacheService::new())),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn heap_mb(mut self, heap_mb: f64) -> Self {
        self.heap_mb = heap_mb;
        self
    }

    pub fn database(mut self, database: Option<Arc<dyn DatabaseProbe>>) -> Self {
        self.database = database;
        self
    }

    pub fn cache_service(mut self, cache_service: CacheServiceHandle) -> Self {
        self.cache_service = cache_service;
        self
    }

    pub fn build(self) -> Application {
        Application::with_components(
            self.config,
            Arc::new(ManualMemoryProbe::new(self.heap_mb)),
            self.database,
            self.cache_service,
        )
        .unwrap()
    }
}

/// Read a response body as JSON.
pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
