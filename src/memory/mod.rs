//! Memory reclamation.
//!
//! Named, typed object pools plus a periodic monitor that forces a collection
//! above the high-water mark and drops pooled objects above the critical mark.

pub mod manager;
pub mod pool;
pub mod probe;

pub use manager::{GcOutcome, GcReport, MemoryManager, MemoryStats, MonitorOutcome};
pub use pool::{ObjectPool, PoolKey, PoolStats, Pooled, ReleaseOutcome};
pub use probe::{ManualMemoryProbe, MemoryProbe, MemoryUsage, ProbeReading, ProcessMemoryProbe};
