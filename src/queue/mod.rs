//! Task queue for the crawl
//!
//! This module provides the queue the orchestrator enqueues into and the
//! worker pool that drains it:
//! - Task definitions for the three crawl task kinds
//! - A SQLite-backed queue with delayed visibility and leases
//! - Per-kind dispatch rate limits
//! - A pool of workers dispatching to a registered handler

mod rate_limit;
mod sqlite;
mod statistics;
mod task;
mod traits;
mod worker;

pub use rate_limit::{KindLimiters, RateSpec};
pub use sqlite::SqliteTaskQueue;
pub use statistics::WorkerStatistics;
pub use task::{Delivery, Task, TaskKind};
pub use traits::{QueueError, QueueResult, TaskHandler, TaskQueue};
pub use worker::{WorkerOptions, WorkerPool};
