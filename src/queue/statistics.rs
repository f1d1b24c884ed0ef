use crate::queue::TaskKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for a worker pool
#[derive(Debug, Default)]
pub struct WorkerStatistics {
    claimed: AtomicU64,
    claimed_by_kind: [AtomicU64; 3],
    completed: AtomicU64,
    panicked: AtomicU64,
    throttled: AtomicU64,
    queue_errors: AtomicU64,
    busy: AtomicU64,
}

impl WorkerStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a worker as between "looking for work" and "done with it"
    pub(crate) fn enter(&self) {
        self.busy.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_claim(&self, kind: TaskKind) {
        self.claimed.fetch_add(1, Ordering::SeqCst);
        self.claimed_by_kind[kind_slot(kind)].fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_done(&self, panicked: bool) {
        if panicked {
            self.panicked.fetch_add(1, Ordering::SeqCst);
        } else {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::SeqCst);
    }

    /// Tasks handed to a handler so far
    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::SeqCst)
    }

    /// Tasks of one kind handed to a handler so far
    pub fn claimed_of(&self, kind: TaskKind) -> u64 {
        self.claimed_by_kind[kind_slot(kind)].load(Ordering::SeqCst)
    }

    /// Tasks whose handler returned normally
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks whose handler panicked
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::SeqCst)
    }

    /// Dispatch attempts held back by a rate limit
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::SeqCst)
    }

    pub fn queue_errors(&self) -> u64 {
        self.queue_errors.load(Ordering::SeqCst)
    }

    /// Workers currently claiming or handling a task
    pub fn busy(&self) -> u64 {
        self.busy.load(Ordering::SeqCst)
    }

    /// Logs a one-line summary
    pub fn log_summary(&self) {
        tracing::info!(
            claimed = self.claimed(),
            regions = self.claimed_of(TaskKind::ScrapeRegion),
            pages = self.claimed_of(TaskKind::ScrapePage),
            items = self.claimed_of(TaskKind::ScrapeItem),
            completed = self.completed(),
            panicked = self.panicked(),
            throttled = self.throttled(),
            queue_errors = self.queue_errors(),
            "Worker pool statistics"
        );
    }
}

fn kind_slot(kind: TaskKind) -> usize {
    match kind {
        TaskKind::ScrapeRegion => 0,
        TaskKind::ScrapePage => 1,
        TaskKind::ScrapeItem => 2,
    }
}
