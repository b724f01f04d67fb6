//! Query result caching, cursor pagination and transactions.

pub mod pagination;
pub mod query_cache;
pub mod store;

pub use pagination::{CursorKey, Page};
pub use query_cache::{OptimizationReport, QueryCache, QueryMetric};
pub use store::{MemoryStore, MemoryTransaction, Record, Transaction, TransactionalStore};
