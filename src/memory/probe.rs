//! Process memory readings.
//!
//! Rust has no tracing collector, so the ability to force a collection is a
//! capability of the probe rather than an assumption: [`MemoryProbe::try_collect`]
//! returns `false` when the runtime cannot do it.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::time::Instant;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Minimum spacing between two process refreshes; also the shortest window
/// CPU usage is measured over.
const MIN_REFRESH: Duration = Duration::from_secs(1);

/// Memory figures for the current process, in MB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Memory the process is actively using
    pub heap_used_mb: f64,
    /// Resident set size
    pub rss_mb: f64,
    /// Reserved address space
    pub virtual_mb: f64,
}

/// Memory and CPU taken from the same sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeReading {
    pub usage: MemoryUsage,
    pub cpu_usage_percent: f64,
}

/// Source of memory and CPU readings.
pub trait MemoryProbe: Send + Sync {
    /// Memory and CPU together
    fn read(&self) -> ProbeReading {
        ProbeReading {
            usage: self.usage(),
            cpu_usage_percent: self.cpu_usage_percent(),
        }
    }

    /// Current memory usage
    fn usage(&self) -> MemoryUsage;

    /// Process CPU usage since the previous reading (percent of one core)
    fn cpu_usage_percent(&self) -> f64 {
        0.0
    }

    /// Request an immediate collection; `false` when unsupported
    fn try_collect(&self) -> bool {
        false
    }
}

/// Reads the current process through `sysinfo`.
///
/// Readings are refreshed at most once per second and shared by every
/// caller in between.
pub struct ProcessMemoryProbe {
    state: Mutex<ProcessState>,
    pid: Option<Pid>,
}

struct ProcessState {
    system: System,
    last: Option<(Instant, ProbeReading)>,
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!("Cannot resolve current pid, memory readings disabled: {}", e))
            .ok();
        Self {
            state: Mutex::new(ProcessState {
                system: System::new(),
                last: None,
            }),
            pid,
        }
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn read(&self) -> ProbeReading {
        let Some(pid) = self.pid else {
            return ProbeReading::default();
        };

        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some((at, reading)) = state.last {
            if now.duration_since(at) < MIN_REFRESH {
                return reading;
            }
        }

        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let reading = state
            .system
            .process(pid)
            .map(|process| {
                let rss_mb = process.memory() as f64 / BYTES_PER_MB;
                ProbeReading {
                    usage: MemoryUsage {
                        heap_used_mb: rss_mb,
                        rss_mb,
                        virtual_mb: process.virtual_memory() as f64 / BYTES_PER_MB,
                    },
                    cpu_usage_percent: f64::from(process.cpu_usage()),
                }
            })
            .unwrap_or_default();
        state.last = Some((now, reading));
        reading
    }

    fn usage(&self) -> MemoryUsage {
        self.read().usage
    }

    fn cpu_usage_percent(&self) -> f64 {
        self.read().cpu_usage_percent
    }
}

#[derive(Debug)]
struct ManualState {
    heap_mb: f64,
    cpu_percent: f64,
    freed_per_collection: Option<f64>,
    collections: u64,
}

/// Probe whose readings are set by hand; collection support is opt-in.
#[derive(Debug)]
pub struct ManualMemoryProbe {
    state: Mutex<ManualState>,
}

impl ManualMemoryProbe {
    pub fn new(heap_mb: f64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                heap_mb,
                cpu_percent: 0.0,
                freed_per_collection: None,
                collections: 0,
            }),
        }
    }

    /// Make collections supported, each freeing `freed_mb`
    #[must_use]
    pub fn with_collection(self, freed_mb: f64) -> Self {
        self.state.lock().freed_per_collection = Some(freed_mb);
        self
    }

    pub fn set_heap_mb(&self, heap_mb: f64) {
        self.state.lock().heap_mb = heap_mb;
    }

    pub fn set_cpu_percent(&self, cpu_percent: f64) {
        self.state.lock().cpu_percent = cpu_percent;
    }

    /// Number of collections requested so far
    pub fn collections(&self) -> u64 {
        self.state.lock().collections
    }
}

impl MemoryProbe for ManualMemoryProbe {
    fn usage(&self) -> MemoryUsage {
        let heap = self.state.lock().heap_mb;
        MemoryUsage {
            heap_used_mb: heap,
            rss_mb: heap,
            virtual_mb: heap,
        }
    }

    fn cpu_usage_percent(&self) -> f64 {
        self.state.lock().cpu_percent
    }

    fn try_collect(&self) -> bool {
        let mut state = self.state.lock();
        match state.freed_per_collection {
            Some(freed) => {
                state.collections += 1;
                state.heap_mb = (state.heap_mb - freed).max(0.0);
                true
            },
            None => false,
        }
    }
}
