//! Command-line interface for feedguard.
//!
//! Run `feedguard` to serve the health and diagnostic endpoints with
//! development defaults.

use crate::application::Application;
use crate::core::config::{CacheServiceMode, ConfigBuilder, Environment};
use crate::core::{Config, GuardError, Result};
use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Runtime self-protection layer for a social feed service
#[derive(Parser, Debug)]
#[command(name = "feedguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// HTTP port for the health endpoints
    #[arg(short, long, env = "FEEDGUARD_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "FEEDGUARD_BIND")]
    pub bind: Option<IpAddr>,

    /// Configuration file path (default: ~/.config/feedguard/config.yaml)
    #[arg(short, long, env = "FEEDGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment profile whose defaults apply
    #[arg(long, env = "FEEDGUARD_ENV", value_enum)]
    pub env: Option<EnvArg>,

    /// Database `host:port` probed by the health check
    #[arg(long, env = "FEEDGUARD_DATABASE_ADDR")]
    pub database_addr: Option<String>,

    /// Key-value cache service to use
    #[arg(long, env = "FEEDGUARD_CACHE_SERVICE", value_enum)]
    pub cache_service: Option<CacheServiceArg>,

    /// Enable debug logging
    #[arg(short, long, env = "FEEDGUARD_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvArg {
    Development,
    Production,
}

impl From<EnvArg> for Environment {
    fn from(arg: EnvArg) -> Self {
        match arg {
            EnvArg::Development => Environment::Development,
            EnvArg::Production => Environment::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheServiceArg {
    Disabled,
    Embedded,
}

impl From<CacheServiceArg> for CacheServiceMode {
    fn from(arg: CacheServiceArg) -> Self {
        match arg {
            CacheServiceArg::Disabled => CacheServiceMode::Disabled,
            CacheServiceArg::Embedded => CacheServiceMode::Embedded,
        }
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Environment profile defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();
        if let Some(env) = self.env {
            builder = builder.environment(env.into());
        }

        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => {
                let default_path = dirs::config_dir()
                    .map(|d| d.join("feedguard").join("config.yaml"))
                    .unwrap_or_else(|| PathBuf::from("~/.config/feedguard/config.yaml"));
                if !default_path.exists() {
                    return self.build_config_from_args(builder);
                }
                default_path
            },
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(GuardError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(bind) = self.bind {
            builder = builder.bind_address(bind);
        }
        if let Some(addr) = &self.database_addr {
            builder = builder.database_address(addr.clone());
        }
        if let Some(mode) = self.cache_service {
            builder = builder.cache_service(mode.into());
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins, then `FEEDGUARD_LOG_LEVEL`, then the configured level;
    /// `--debug` forces debug.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level =
            std::env::var("FEEDGUARD_LOG_LEVEL").unwrap_or_else(|_| config.logging.level.as_str().to_string());
        let log_level = if self.debug || config.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| GuardError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute feedguard.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Environment: {:?}", config.environment);
        println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
        println!(
            "  Rate limit: {} requests / {:?}",
            config.admission.rate_limit.max_requests, config.admission.rate_limit.window
        );
        println!(
            "  Circuit breaker: {}MB heap, {} connections",
            config.admission.circuit_breaker.max_heap_mb, config.admission.circuit_breaker.max_active_connections
        );
        println!(
            "  GC marks: {}MB / {}MB",
            config.memory.gc_high_water_mb, config.memory.gc_critical_mb
        );
        return Ok(());
    }

    tracing::info!(environment = ?config.environment, "Starting feedguard");
    let app = Application::new(config)?;

    app.serve(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal, stopping...");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli() -> Cli {
        Cli {
            port: None,
            bind: None,
            config: None,
            env: None,
            database_addr: None,
            cache_service: None,
            debug: false,
            check_config: false,
        }
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "feedguard",
            "--port",
            "9090",
            "--env",
            "production",
            "--cache-service",
            "embedded",
            "--check-config",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9090));
        assert_eq!(cli.env, Some(EnvArg::Production));
        assert_eq!(cli.cache_service, Some(CacheServiceArg::Embedded));
        assert!(cli.check_config);
    }

    #[tokio::test]
    async fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 7000\ndatabase:\n  address: \"db:5432\"").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            port: Some(7100),
            ..cli()
        };
        let config = cli.load_config().await.unwrap();

        assert_eq!(config.server.port, 7100);
        assert_eq!(config.database.address.as_deref(), Some("db:5432"));
    }

    #[tokio::test]
    async fn test_env_flag_selects_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment: development\nserver:\n  port: 8081").unwrap();
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            env: Some(EnvArg::Production),
            ..cli()
        };

        let config = cli.load_config().await.unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database.pool_size, 50);
        assert_eq!(config.server.port, 8081);
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/feedguard.yaml")),
            ..cli()
        };
        assert!(matches!(cli.load_config().await, Err(GuardError::Config(_))));
    }
}
