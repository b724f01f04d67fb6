//! Configuration management for feedguard.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment profiles (`development` / `production`)
//! - CLI argument overrides
//! - Validation and defaults
//!
//! Configuration is static: it is read once at startup and never reloaded.

use crate::core::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Complete configuration for feedguard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment profile the defaults were derived from
    pub environment: Environment,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Admission control (rate limit, queues, circuit breaker)
    pub admission: AdmissionConfig,
    /// Request/query/memory metrics
    pub metrics: MetricsConfig,
    /// Query cache
    pub cache: CacheConfig,
    /// Memory reclamation
    pub memory: MemoryConfig,
    /// Health aggregation and scalability estimates
    pub health: HealthConfig,
    /// Database probe
    pub database: DatabaseConfig,
    /// Key-value cache service
    pub cache_service: CacheServiceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: IpAddr,
    /// HTTP port
    pub port: u16,
    /// Enable permissive CORS headers
    pub enable_cors: bool,
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Per-identity rate limiting
    pub rate_limit: RateLimitConfig,
    /// Per-endpoint in-flight queues
    pub queues: QueueConfig,
    /// Circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Background refresh of the health snapshot
    #[serde(with = "humantime_serde")]
    pub health_refresh_interval: Duration,
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window when no rule matches
    pub max_requests: u32,
    /// Window length when no rule matches
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Ordered path rules; the first substring match wins
    pub rules: Vec<RateLimitRule>,
    /// Entries whose window expired this long ago are swept
    #[serde(with = "humantime_serde")]
    pub sweep_idle: Duration,
}

/// Rate limit override for paths containing `pattern`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub pattern: String,
    pub max_requests: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

/// Per-endpoint queue capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity for endpoints matching no rule
    pub default_capacity: usize,
    /// Ordered endpoint rules; the first substring match wins
    pub rules: Vec<QueueRule>,
}

/// Queue capacity for endpoints containing `pattern`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRule {
    pub pattern: String,
    pub capacity: usize,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Trip when heap usage exceeds this many MB
    pub max_heap_mb: f64,
    /// Trip when in-flight requests exceed this count
    pub max_active_connections: usize,
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Latency samples kept per endpoint
    pub latency_window: usize,
    /// Database query durations kept
    pub db_query_window: usize,
    /// Memory samples kept
    pub memory_window: usize,
    /// Memory sampling interval
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Interval between logged performance reports
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Reset counters after each logged report
    pub rotate_reports: bool,
    /// Health classification thresholds
    pub thresholds: PerformanceThresholds,
}

/// Thresholds used to classify the performance report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub heap_warning_mb: f64,
    pub heap_critical_mb: f64,
    pub query_warning_ms: f64,
    pub query_critical_ms: f64,
    pub min_cache_hit_rate: f64,
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used when callers do not pick one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Expired entry sweep interval
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Query metrics retained for the optimization report
    pub max_metrics: usize,
    /// Non-cached executions slower than this are reported
    pub slow_query_ms: f64,
}

/// Memory reclamation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory monitor interval
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// Force a collection above this heap size
    pub gc_high_water_mb: f64,
    /// Also clear every pool above this heap size
    pub gc_critical_mb: f64,
    /// Collections freeing less than this are not logged
    pub gc_noise_threshold_mb: f64,
}

/// Health aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Memory component turns degraded above this
    pub memory_warning_mb: f64,
    /// Memory component turns unhealthy above this
    pub memory_critical_mb: f64,
    /// Database component turns degraded when ping is slower than this
    pub database_slow_ms: f64,
    /// Upper bound on each external probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Load balancer turns degraded when any queue is this full (0.0-1.0)
    pub queue_degraded_utilization: f64,
    /// Capacity projection constants
    pub scalability: ScalabilityConfig,
}

/// Constants for the scalability projection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalabilityConfig {
    /// Memory budget the process may grow to
    pub memory_budget_mb: f64,
    /// Estimated memory cost of one concurrent user
    pub memory_per_user_mb: f64,
    /// Concurrent users served per database query per second
    pub users_per_db_qps: f64,
    /// Concurrent users implied by one request per minute of throughput
    pub users_per_rpm: f64,
    /// Throughput estimate used before any traffic is observed
    pub baseline_capacity: f64,
    /// Multiplier from the binding estimate to the maximum projection
    pub max_multiplier: f64,
}

/// Database probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `host:port` probed by TCP connect; `None` disables the probe
    pub address: Option<String>,
    /// Connection pool size reported by the probe
    pub pool_size: u32,
}

/// Key-value cache service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheServiceConfig {
    pub mode: CacheServiceMode,
}

/// How the key-value cache service is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheServiceMode {
    /// No cache service; health reports it as degraded
    #[default]
    Disabled,
    /// In-process key-value store
    Embedded,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: Environment::Development,
            server: ServerConfig::default(),
            admission: AdmissionConfig::default(),
            metrics: MetricsConfig::default(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            health: HealthConfig::default(),
            database: DatabaseConfig::default(),
            cache_service: CacheServiceConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        AdmissionConfig {
            rate_limit: RateLimitConfig::default(),
            queues: QueueConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_refresh_interval: Duration::from_secs(5),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests: 100,
            window: Duration::from_secs(60),
            rules: vec![RateLimitRule {
                pattern: "/auth".to_string(),
                max_requests: 10,
                window: Duration::from_secs(15 * 60),
            }],
            sweep_idle: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            default_capacity: 50,
            rules: vec![
                QueueRule {
                    pattern: "/feed".to_string(),
                    capacity: 200,
                },
                QueueRule {
                    pattern: "/posts".to_string(),
                    capacity: 100,
                },
                QueueRule {
                    pattern: "/upload".to_string(),
                    capacity: 10,
                },
            ],
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            max_heap_mb: 1024.0,
            max_active_connections: 1000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            latency_window: 100,
            db_query_window: 1000,
            memory_window: 100,
            sample_interval: Duration::from_secs(30),
            report_interval: Duration::from_secs(10 * 60),
            rotate_reports: true,
            thresholds: PerformanceThresholds::default(),
        }
    }
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        PerformanceThresholds {
            heap_warning_mb: 512.0,
            heap_critical_mb: 1024.0,
            query_warning_ms: 100.0,
            query_critical_ms: 500.0,
            min_cache_hit_rate: 0.7,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            max_metrics: 1000,
            slow_query_ms: 100.0,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            monitor_interval: Duration::from_secs(60),
            gc_high_water_mb: 600.0,
            gc_critical_mb: 800.0,
            gc_noise_threshold_mb: 50.0,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            memory_warning_mb: 700.0,
            memory_critical_mb: 900.0,
            database_slow_ms: 500.0,
            probe_timeout: Duration::from_secs(5),
            queue_degraded_utilization: 0.8,
            scalability: ScalabilityConfig::default(),
        }
    }
}

impl Default for ScalabilityConfig {
    fn default() -> Self {
        ScalabilityConfig {
            memory_budget_mb: 1024.0,
            memory_per_user_mb: 2.0,
            users_per_db_qps: 1.0,
            users_per_rpm: 0.5,
            baseline_capacity: 1000.0,
            max_multiplier: 1.5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            address: None,
            pool_size: 20,
        }
    }
}

impl Default for CacheServiceConfig {
    fn default() -> Self {
        CacheServiceConfig {
            mode: CacheServiceMode::Disabled,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Defaults for a deployment profile.
    ///
    /// Production raises connection, heap and memory budgets.
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Config {
            environment,
            ..Config::default()
        };

        if environment == Environment::Production {
            config.admission.circuit_breaker.max_heap_mb = 2048.0;
            config.admission.circuit_breaker.max_active_connections = 5000;
            config.metrics.thresholds.heap_warning_mb = 1024.0;
            config.metrics.thresholds.heap_critical_mb = 2048.0;
            config.memory.gc_high_water_mb = 1200.0;
            config.memory.gc_critical_mb = 1600.0;
            config.health.memory_warning_mb = 1400.0;
            config.health.memory_critical_mb = 1800.0;
            config.health.scalability.memory_budget_mb = 2048.0;
            config.database.pool_size = 50;
            config.logging.structured = true;
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let rate = &self.admission.rate_limit;
        if rate.max_requests == 0 || rate.window.is_zero() {
            return Err(GuardError::config(
                "rate_limit.max_requests and rate_limit.window must be greater than 0",
            ));
        }
        for rule in &rate.rules {
            if rule.max_requests == 0 || rule.window.is_zero() {
                return Err(GuardError::config(format!(
                    "Invalid rate limit rule for '{}': limit and window must be greater than 0",
                    rule.pattern
                )));
            }
        }

        if self.admission.queues.default_capacity == 0 {
            return Err(GuardError::config("queues.default_capacity must be greater than 0"));
        }
        for rule in &self.admission.queues.rules {
            if rule.capacity == 0 {
                return Err(GuardError::config(format!(
                    "Invalid queue capacity for '{}': must be greater than 0",
                    rule.pattern
                )));
            }
        }

        let metrics = &self.metrics;
        if metrics.latency_window == 0 || metrics.db_query_window == 0 || metrics.memory_window == 0
        {
            return Err(GuardError::config("metrics windows must be greater than 0"));
        }

        let thresholds = &metrics.thresholds;
        if thresholds.heap_warning_mb >= thresholds.heap_critical_mb {
            return Err(GuardError::config(format!(
                "heap_warning_mb ({}) must be below heap_critical_mb ({})",
                thresholds.heap_warning_mb, thresholds.heap_critical_mb
            )));
        }
        if thresholds.query_warning_ms >= thresholds.query_critical_ms {
            return Err(GuardError::config(format!(
                "query_warning_ms ({}) must be below query_critical_ms ({})",
                thresholds.query_warning_ms, thresholds.query_critical_ms
            )));
        }
        if !(0.0..=1.0).contains(&thresholds.min_cache_hit_rate) {
            return Err(GuardError::config(format!(
                "min_cache_hit_rate must be between 0.0 and 1.0, got {}",
                thresholds.min_cache_hit_rate
            )));
        }

        if self.memory.gc_high_water_mb >= self.memory.gc_critical_mb {
            return Err(GuardError::config(format!(
                "gc_high_water_mb ({}) must be below gc_critical_mb ({})",
                self.memory.gc_high_water_mb, self.memory.gc_critical_mb
            )));
        }

        if self.health.memory_warning_mb >= self.health.memory_critical_mb {
            return Err(GuardError::config(format!(
                "memory_warning_mb ({}) must be below memory_critical_mb ({})",
                self.health.memory_warning_mb, self.health.memory_critical_mb
            )));
        }

        let scalability = &self.health.scalability;
        if scalability.memory_per_user_mb <= 0.0 {
            return Err(GuardError::config("memory_per_user_mb must be greater than 0"));
        }
        if scalability.max_multiplier < 1.0 {
            return Err(GuardError::config("max_multiplier must be at least 1.0"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
    forced_environment: Option<Environment>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
            forced_environment: None,
        }
    }

    /// Start from the defaults of `environment`.
    ///
    /// Call before [`ConfigBuilder::from_yaml`]: the forced profile wins over
    /// an `environment` key in the file.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.forced_environment = Some(environment);
        self.config = Config::for_environment(environment);
        self
    }

    /// Load configuration from YAML string.
    ///
    /// Keys present in the document override the defaults of the selected
    /// environment; absent keys keep them.
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        let overlay: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::config(format!("Failed to parse YAML config: {}", e)))?;

        let file_environment = overlay
            .get("environment")
            .cloned()
            .map(serde_yaml::from_value::<Environment>)
            .transpose()
            .map_err(|e| GuardError::config(format!("Invalid environment: {}", e)))?;
        let environment = self
            .forced_environment
            .or(file_environment)
            .unwrap_or(self.config.environment);

        let base = Config::for_environment(environment);
        let mut merged = serde_yaml::to_value(&base)
            .map_err(|e| GuardError::config(format!("Failed to encode defaults: {}", e)))?;
        merge_yaml(&mut merged, overlay);

        let debug = self.config.debug;
        self.config = serde_yaml::from_value(merged)
            .map_err(|e| GuardError::config(format!("Failed to parse YAML config: {}", e)))?;
        self.config.environment = environment;
        self.config.debug = debug;
        Ok(self)
    }

    /// Set HTTP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set bind address
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.config.server.bind_address = address;
        self
    }

    /// Set the database probe address
    pub fn database_address(mut self, address: impl Into<String>) -> Self {
        self.config.database.address = Some(address.into());
        self
    }

    /// Set the cache service mode
    pub fn cache_service(mut self, mode: CacheServiceMode) -> Self {
        self.config.cache_service.mode = mode;
        self
    }

    /// Set the default rate limit
    pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.config.admission.rate_limit.max_requests = max_requests;
        self.config.admission.rate_limit.window = window;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Recursively overlay `overlay` onto `base`; mappings merge, everything else replaces.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}
