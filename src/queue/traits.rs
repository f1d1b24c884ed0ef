//! Queue traits and error types

use crate::queue::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Queue lock poisoned")]
    Poisoned,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Enqueue side of the task queue, as seen by the orchestrator
///
/// Delivery is at-least-once with no ordering guarantee. A task must not
/// become visible to workers before `not_before`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task, not_before: DateTime<Utc>) -> QueueResult<()>;
}

/// Consumer of delivered tasks
///
/// Handlers report failures through logs only; `handle` returns nothing
/// the queue could retry on.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task);
}
