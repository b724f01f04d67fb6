//! Admission control.
//!
//! Every inbound request passes the circuit breaker, the per-identity rate
//! limit and the per-endpoint queue, in that order. The first failing check
//! rejects the request with a fixed retry hint; nothing is retried internally.

pub mod controller;
pub mod middleware;
pub mod queue;
pub mod rate_limit;

pub use controller::{AdmissionController, AdmissionTotals, HealthSnapshot, LoadBalancerSnapshot, Rejection};
pub use middleware::{admission_middleware, CallerIdentity};
pub use queue::{QueuePermit, QueueStatus};
pub use rate_limit::RateDecision;
