//! Memory pressure handling through the application context.

mod common;

use common::TestApp;
use feedguard_lib::core::Config;
use feedguard_lib::health::CacheServiceHandle;
use feedguard_lib::memory::{ManualMemoryProbe, MemoryProbe, PoolKey, ReleaseOutcome};
use feedguard_lib::Application;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const BUFFERS: PoolKey<Vec<u8>> = PoolKey::new("response-buffers");

#[test]
fn test_pooled_buffers_are_reset_and_reused() {
    let app = TestApp::new().build();
    let memory = app.memory();
    memory.create_pool(BUFFERS, || Vec::with_capacity(4096), Vec::clear, 8);

    let mut buffer = memory.acquire(BUFFERS).unwrap();
    buffer.extend_from_slice(b"timeline");
    let token = buffer.token();
    assert_eq!(memory.release(BUFFERS, buffer), ReleaseOutcome::Returned);

    let reused = memory.acquire(BUFFERS).unwrap();
    assert!(reused.is_empty());
    assert!(reused.capacity() >= 4096);
    assert_ne!(reused.token(), token);

    let stats = memory.memory_stats();
    assert_eq!(stats.pools["response-buffers"].in_use, 1);
    assert_eq!(stats.pools["response-buffers"].available, 0);
}

#[test]
fn test_critical_pressure_drops_pools_but_not_loans() {
    let probe = Arc::new(ManualMemoryProbe::new(100.0).with_collection(0.0));
    let app = Application::with_components(
        Config::default(),
        Arc::clone(&probe) as Arc<dyn MemoryProbe>,
        None,
        CacheServiceHandle::Absent,
    )
    .unwrap();
    let memory = app.memory();
    memory.create_pool(BUFFERS, Vec::new, Vec::clear, 8);

    let spare = memory.acquire(BUFFERS).unwrap();
    memory.release(BUFFERS, spare);
    let mut lent = memory.acquire(BUFFERS).unwrap();

    probe.set_heap_mb(850.0);
    let outcome = memory.monitor_memory();
    assert!(outcome.gc.is_some());
    assert!(outcome.pools_cleared);
    assert_eq!(probe.collections(), 1);

    // the caller still owns its loan; returning it afterwards is a no-op
    lent.push(1);
    assert_eq!(memory.release(BUFFERS, lent), ReleaseOutcome::Ignored);
    let stats = memory.memory_stats();
    assert_eq!(stats.pools["response-buffers"].available, 0);
    assert_eq!(stats.pools["response-buffers"].in_use, 0);
    assert_eq!(stats.gc_runs, 1);
}
