//! Periodic background tasks.
//!
//! Each task runs on its own interval. Every tick executes in a freshly
//! spawned task, so an error or a panic is logged and counted without
//! stopping the schedule or the process. All timing goes through
//! `tokio::time`, which lets tests drive the schedule with a paused clock.

use crate::core::Result;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named job repeated every `period`.
pub struct PeriodicTask {
    name: &'static str,
    period: Duration,
    job: Job,
}

impl PeriodicTask {
    pub fn new<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name,
            period,
            job: Arc::new(move || Box::pin(job())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[derive(Debug, Default)]
struct TaskCounters {
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Run totals for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    pub runs: u64,
    pub failures: u64,
}

/// Collects tasks before they are started.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: PeriodicTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn every task; the first tick of each fires one period from now.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut counters = BTreeMap::new();
        let mut handles = Vec::with_capacity(self.tasks.len());

        for task in self.tasks {
            let task_counters = Arc::new(TaskCounters::default());
            counters.insert(task.name, Arc::clone(&task_counters));
            tracing::debug!(task = task.name, period = ?task.period, "Scheduling periodic task");
            handles.push(tokio::spawn(run_task(task, task_counters, shutdown_rx.clone())));
        }

        SchedulerHandle {
            shutdown: shutdown_tx,
            handles,
            counters,
        }
    }
}

/// Running schedule.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    counters: BTreeMap<&'static str, Arc<TaskCounters>>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> BTreeMap<&'static str, TaskStats> {
        self.counters
            .iter()
            .map(|(name, counters)| {
                let stats = TaskStats {
                    runs: counters.runs.load(Ordering::Relaxed),
                    failures: counters.failures.load(Ordering::Relaxed),
                };
                (*name, stats)
            })
            .collect()
    }

    /// Stop every task after its current tick, if any, completes.
    pub async fn shutdown(self) {
        // receivers only disappear once every task has exited
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Scheduler task did not exit cleanly");
            }
        }
        tracing::debug!("Scheduler stopped");
    }
}

async fn run_task(task: PeriodicTask, counters: Arc<TaskCounters>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + task.period, task.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                counters.runs.fetch_add(1, Ordering::Relaxed);
                match tokio::spawn((task.job)()).await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(task = task.name, error = %e, category = e.category(), "Periodic task failed");
                    },
                    Err(e) if e.is_panic() => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(task = task.name, "Periodic task panicked");
                    },
                    Err(e) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(task = task.name, error = %e, "Periodic task cancelled");
                    },
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
