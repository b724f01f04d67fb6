//! Feedguard - runtime self-protection for a social feed service.
//!
//! Feedguard sits in front of the feed's request handlers and keeps the
//! process healthy under load. It admits or rejects requests, measures what
//! the service is doing, caches query results and reclaims memory.
//!
//! # Features
//!
//! - **Admission control**: circuit breaker, per-identity rate limits and
//!   per-endpoint concurrency queues, applied as an axum middleware
//! - **Performance metrics**: bounded latency, query and heap windows with a
//!   derived health verdict
//! - **Query cache**: TTL-bounded memoization, batching, cursor pagination
//!   and transactions
//! - **Memory reclamation**: typed object pools and pressure-driven collection
//! - **Health reporting**: `/health` for load balancers plus a capacity
//!   projection for dashboards
//!
//! # Architecture
//!
//! - `core`: configuration, errors and the health vocabulary
//! - `metrics`: the performance monitor
//! - `admission`: rate limits, queues and the circuit breaker
//! - `cache`: query cache, pagination and transactions
//! - `memory`: object pools and the memory monitor
//! - `health`: dependency probes and the health aggregator
//! - `scheduler`: periodic background tasks
//! - `api`: health and diagnostic HTTP routes
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use feedguard_lib::core::Config;
//! use feedguard_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Application::new(Config::default())?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod admission;
pub mod api;
pub mod application;
pub mod cache;
pub mod cli;
pub mod core;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod scheduler;

// Re-export core types for convenience
pub use crate::application::Application;
pub use crate::core::{Config, GuardError, Result};
