use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database probe error: {0}")]
    Database(String),

    #[error("Cache service error: {0}")]
    CacheService(String),

    #[error("Object pool not registered: {0}")]
    PoolNotFound(String),

    #[error("Object pool '{name}' holds a different object type")]
    PoolTypeMismatch { name: String },

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for feedguard operations
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new database probe error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a new cache service error
    pub fn cache_service<S: Into<String>>(msg: S) -> Self {
        Self::CacheService(msg.into())
    }

    /// Creates a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if retrying the same operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::Database(_) | Self::CacheService(_)
        )
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Database(_) => "database",
            Self::CacheService(_) => "cache_service",
            Self::PoolNotFound(_) | Self::PoolTypeMismatch { .. } => "pool",
            Self::Transaction(_) => "transaction",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
            Self::Network(_) => "network",
        }
    }
}
