//! Worker pool draining the task queue
//!
//! Each worker rotates over the task kinds, claims the next visible task of
//! a kind whose rate limit has a permit, runs the handler on its own tokio
//! task and acknowledges the delivery whatever the outcome. Shutdown is
//! cooperative through a [`CancellationToken`]: in-flight handlers finish,
//! no new tasks are claimed.

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::queue::{Delivery, KindLimiters, SqliteTaskQueue, TaskHandler, TaskKind, WorkerStatistics};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Worker pool tuning
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Number of concurrent workers
    pub workers: usize,

    /// Sleep between polls when no task is dispatchable
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl WorkerOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            workers: config.workers as usize,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Pool of workers dispatching queued tasks to one handler
pub struct WorkerPool {
    queue: Arc<SqliteTaskQueue>,
    handler: Arc<dyn TaskHandler>,
    limiters: Arc<KindLimiters>,
    clock: Arc<dyn Clock>,
    options: WorkerOptions,
    stats: Arc<WorkerStatistics>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<SqliteTaskQueue>,
        handler: Arc<dyn TaskHandler>,
        limiters: KindLimiters,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            handler,
            limiters: Arc::new(limiters),
            clock: Arc::new(SystemClock),
            options,
            stats: Arc::new(WorkerStatistics::new()),
        }
    }

    /// Uses `clock` to decide which tasks are visible
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn statistics(&self) -> Arc<WorkerStatistics> {
        self.stats.clone()
    }

    /// Runs the workers until `token` is cancelled
    pub async fn run(&self, token: CancellationToken) {
        let workers = self.options.workers.max(1);
        tracing::info!(workers, "Starting worker pool");

        let tracker = TaskTracker::new();
        for id in 0..workers {
            let worker = self.worker(id);
            let token = token.clone();
            tracker.spawn(async move { worker.run(token).await });
        }
        tracker.close();
        tracker.wait().await;

        tracing::info!("Worker pool stopped");
        self.stats.log_summary();
    }

    /// Runs the workers until no task is visible and none is being handled
    ///
    /// Tasks scheduled for the future do not keep the pool alive.
    pub async fn run_until_idle(&self) {
        let token = CancellationToken::new();
        let watcher = async {
            loop {
                tokio::time::sleep(self.options.poll_interval).await;
                if self.is_idle() {
                    tracing::debug!("Queue idle, stopping workers");
                    token.cancel();
                    break;
                }
            }
        };
        tokio::join!(self.run(token.clone()), watcher);
    }

    /// True if no worker is busy and no task is visible right now
    pub fn is_idle(&self) -> bool {
        let claimed_before = self.stats.claimed();
        if self.stats.busy() > 0 {
            return false;
        }

        let now = self.clock.now();
        for kind in TaskKind::ALL {
            match self.queue.has_visible(kind, now) {
                Ok(false) => {}
                Ok(true) => return false,
                Err(e) => {
                    tracing::error!("Failed to inspect queue: {}", e);
                    return false;
                }
            }
        }

        // A task claimed while we were looking would have gone unseen
        self.stats.busy() == 0 && self.stats.claimed() == claimed_before
    }

    fn worker(&self, id: usize) -> Worker {
        Worker {
            id,
            queue: self.queue.clone(),
            handler: self.handler.clone(),
            limiters: self.limiters.clone(),
            clock: self.clock.clone(),
            stats: self.stats.clone(),
            poll_interval: self.options.poll_interval,
        }
    }
}

struct Worker {
    id: usize,
    queue: Arc<SqliteTaskQueue>,
    handler: Arc<dyn TaskHandler>,
    limiters: Arc<KindLimiters>,
    clock: Arc<dyn Clock>,
    stats: Arc<WorkerStatistics>,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, token: CancellationToken) {
        tracing::debug!(worker = self.id, "Worker started");
        let mut rotation = self.id;

        while !token.is_cancelled() {
            self.stats.enter();
            let delivery = self.next_delivery(rotation);
            rotation = rotation.wrapping_add(1);

            let dispatched = match delivery {
                Some(delivery) => {
                    self.dispatch(delivery).await;
                    true
                }
                None => false,
            };
            self.stats.leave();

            if !dispatched {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_sleep()) => {}
                }
            }
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    /// Poll interval, cut short if a task falls due sooner
    fn idle_sleep(&self) -> Duration {
        let now = self.clock.now();
        TaskKind::ALL
            .iter()
            .filter_map(|kind| self.queue.next_visible_at(*kind).ok().flatten())
            .filter_map(|due| (due - now).to_std().ok())
            .filter(|wait| !wait.is_zero())
            .fold(self.poll_interval, Duration::min)
    }

    /// Claims one task, trying each kind once starting at `rotation`
    fn next_delivery(&self, rotation: usize) -> Option<Delivery> {
        let kinds = TaskKind::ALL;
        for offset in 0..kinds.len() {
            let kind = kinds[(rotation + offset) % kinds.len()];
            let now = self.clock.now();

            match self.queue.has_visible(kind, now) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    self.stats.record_queue_error();
                    tracing::error!(kind = %kind, "Failed to poll queue: {}", e);
                    continue;
                }
            }

            // The permit is spent even if another worker wins the claim or the
            // claim fails. This can only slow a kind below its rate, never
            // push it above.
            if let Err(wait) = self.limiters.check(kind) {
                self.stats.record_throttled();
                tracing::trace!(kind = %kind, ?wait, "Rate limited");
                continue;
            }

            match self.queue.claim(kind, now) {
                Ok(Some(delivery)) => {
                    self.stats.record_claim(kind);
                    return Some(delivery);
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.record_queue_error();
                    tracing::error!(kind = %kind, "Failed to claim task: {}", e);
                }
            }
        }
        None
    }

    async fn dispatch(&self, delivery: Delivery) {
        tracing::debug!(
            worker = self.id,
            task = %delivery.task,
            attempt = delivery.attempts,
            "Dispatching task"
        );

        let handler = self.handler.clone();
        let task = delivery.task.clone();
        let result = tokio::spawn(async move { handler.handle(task).await }).await;

        let panicked = match result {
            Ok(()) => false,
            Err(e) => {
                tracing::error!(task = %delivery.task, "Task handler crashed: {}", e);
                true
            }
        };
        self.stats.record_done(panicked);

        if let Err(e) = self.queue.ack(delivery.id) {
            self.stats.record_queue_error();
            tracing::error!(task = %delivery.task, "Failed to acknowledge task: {}", e);
        }
    }
}
