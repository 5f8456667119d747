use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// A live repeating task. Cancelling consumes it.
pub struct TickHandle {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
}

impl TickHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn cancel(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Owns every periodic task, keyed by task id.
///
/// At most one handle exists per id: starting a task replaces and cancels
/// the previous handle for that id. Dropping the scheduler stops everything.
pub struct PeriodicScheduler {
    runtime: Handle,
    closed: AtomicBool,
    next_generation: AtomicU64,
    tasks: Mutex<HashMap<String, TickHandle>>,
}

impl PeriodicScheduler {
    /// Must be called from inside a tokio runtime; ticks run on that runtime.
    pub fn new() -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("scheduler needs a tokio runtime")?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            closed: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TickHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts `tick` every `interval` under `task_id`, returning the new
    /// handle's generation, or `None` once the scheduler is shut down.
    ///
    /// The first tick fires one interval after the call. Ticks never overlap:
    /// the next period is awaited only once `tick` has returned, and periods
    /// missed while the runtime was starved are skipped.
    pub fn start<F>(&self, task_id: &str, interval: Duration, tick: F) -> Option<u64>
    where
        F: FnMut() + Send + 'static,
    {
        let mut tasks = self.tasks();
        // checked under the lock so a concurrent shutdown cannot miss this task
        if self.is_closed() {
            log::debug!("Scheduler: {} not started, scheduler is shut down", task_id);
            return None;
        }
        if let Some(previous) = tasks.remove(task_id) {
            log::debug!(
                "Scheduler: replacing {} (generation {})",
                task_id,
                previous.generation
            );
            previous.cancel();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let task = self.runtime.spawn(run_ticks(
            interval,
            cancel.clone(),
            Arc::clone(&ticks),
            tick,
        ));

        tasks.insert(
            task_id.to_string(),
            TickHandle {
                generation,
                cancel,
                task,
                ticks,
            },
        );
        log::debug!(
            "Scheduler: started {} every {:?} (generation {})",
            task_id,
            interval,
            generation
        );
        Some(generation)
    }

    /// Cancels `task_id`. Returns whether it was running.
    pub fn stop(&self, task_id: &str) -> bool {
        match self.tasks().remove(task_id) {
            Some(handle) => {
                log::debug!(
                    "Scheduler: stopped {} after {} ticks",
                    task_id,
                    handle.ticks()
                );
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every live task. Returns how many were running.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<_> = self.tasks().drain().collect();
        let count = drained.len();
        for (_, handle) in drained {
            handle.cancel();
        }
        if count > 0 {
            log::debug!("Scheduler: stopped {} tasks", count);
        }
        count
    }

    /// Stops everything and refuses any later `start`.
    pub fn shutdown(&self) -> usize {
        {
            let _tasks = self.tasks();
            self.closed.store(true, Ordering::SeqCst);
        }
        log::debug!("Scheduler: shut down");
        self.stop_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.tasks().contains_key(task_id)
    }

    pub fn live_count(&self) -> usize {
        self.tasks().len()
    }

    pub fn ticks(&self, task_id: &str) -> Option<u64> {
        self.tasks().get(task_id).map(|h| h.ticks())
    }

    pub fn generation(&self, task_id: &str) -> Option<u64> {
        self.tasks().get(task_id).map(|h| h.generation())
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_ticks<F>(
    period: Duration,
    cancel: CancellationToken,
    ticks: Arc<AtomicU64>,
    mut tick: F,
) where
    F: FnMut() + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = interval.tick() => {
                tick();
                ticks.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
