//! Health aggregation and capacity projection.

pub mod aggregator;
pub mod probes;
pub mod scalability;

pub use aggregator::{
    CapacityOverview, HealthAggregator, HealthComponents, HealthMetrics, HealthReport, ScalabilityReport,
};
pub use probes::{CacheService, CacheServiceHandle, DatabaseProbe, EmbeddedCacheService, TcpDatabaseProbe};
pub use scalability::{Constraint, ScalabilityAssessment};
