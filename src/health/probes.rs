//! External collaborators consumed only through narrow probes.

use crate::core::config::{CacheServiceMode, DatabaseConfig};
use crate::core::{GuardError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Liveness probe for the backing database.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Configured connection pool size
    fn pool_size(&self) -> u32;
}

/// Probes the database by opening a TCP connection to its address.
#[derive(Debug, Clone)]
pub struct TcpDatabaseProbe {
    address: String,
    pool_size: u32,
    connect_timeout: Duration,
}

impl TcpDatabaseProbe {
    pub fn new(address: impl Into<String>, pool_size: u32, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            pool_size,
            connect_timeout,
        }
    }

    /// `None` when no address is configured
    pub fn from_config(config: &DatabaseConfig, connect_timeout: Duration) -> Option<Self> {
        config
            .address
            .as_ref()
            .map(|address| Self::new(address.clone(), config.pool_size, connect_timeout))
    }
}

#[async_trait]
impl DatabaseProbe for TcpDatabaseProbe {
    async fn ping(&self) -> Result<()> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(GuardError::database(format!("connect to {} failed: {}", self.address, e))),
            Err(_) => Err(GuardError::Timeout {
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }

    fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

/// Key-value cache service.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
}

/// In-process cache service.
#[derive(Debug, Default)]
pub struct EmbeddedCacheService {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl EmbeddedCacheService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheService for EmbeddedCacheService {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let value = self.entries.get(key).and_then(|entry| {
            let (value, expires_at) = entry.value();
            match expires_at {
                Some(at) if *at <= now => None,
                _ => Some(value.clone()),
            }
        });
        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| expires_at.is_some_and(|at| at <= now));
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }
}

/// Cache service that may not be deployed.
#[derive(Clone)]
pub enum CacheServiceHandle {
    Present(Arc<dyn CacheService>),
    Absent,
}

impl CacheServiceHandle {
    pub fn from_mode(mode: CacheServiceMode) -> Self {
        match mode {
            CacheServiceMode::Embedded => CacheServiceHandle::Present(Arc::new(EmbeddedCacheService::new())),
            CacheServiceMode::Disabled => CacheServiceHandle::Absent,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, CacheServiceHandle::Present(_))
    }
}

impl std::fmt::Debug for CacheServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheServiceHandle::Present(_) => f.write_str("CacheServiceHandle::Present"),
            CacheServiceHandle::Absent => f.write_str("CacheServiceHandle::Absent"),
        }
    }
}
