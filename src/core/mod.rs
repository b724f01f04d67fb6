//! Core types shared by every feedguard component.
//!
//! Configuration, the crate error type and the health vocabulary live here;
//! nothing in this module depends on the components themselves.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, Environment};
pub use error::{GuardError, Result};
pub use types::{ComponentHealth, HealthStatus};
