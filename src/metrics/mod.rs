//! Request, query and memory metrics.
//!
//! A single [`PerformanceMonitor`] per process records per-endpoint latencies
//! and error counts, database query durations, cache hit/miss counts and heap
//! samples, and derives a [`PerformanceReport`] with a health verdict.

pub mod aggregator;
pub mod ring_buffer;

pub use aggregator::{
    CacheSummary, DatabaseSummary, EndpointReport, MemorySample, MemoryTrend, PerformanceMonitor,
    PerformanceReport, RequestSummary,
};
pub use ring_buffer::BoundedRing;
