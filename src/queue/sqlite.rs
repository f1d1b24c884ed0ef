//! SQLite-backed task queue
//!
//! Tasks are rows in a `tasks` table. A row is visible to workers once its
//! `not_before` has passed and it is not under a live lease. Claiming a row
//! leases it for the visibility timeout; acknowledging deletes it. A worker
//! that dies mid-task lets the lease lapse and the row is delivered again.

use crate::config::QueueConfig;
use crate::queue::traits::{QueueError, QueueResult, TaskQueue};
use crate::queue::{Delivery, Task, TaskKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQL schema for the task queue
const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    not_before INTEGER NOT NULL,
    leased_until INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    enqueued_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_kind_visible ON tasks(kind, not_before);
"#;

/// Durable task queue with delayed visibility and leases
pub struct SqliteTaskQueue {
    conn: Mutex<Connection>,
    visibility_timeout: Duration,
    max_attempts: u32,
}

impl SqliteTaskQueue {
    /// Opens or creates the queue at `path`
    pub fn new(path: &Path) -> QueueResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory queue (for testing)
    pub fn new_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens the queue named in the config with its lease settings
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        Ok(Self::new(Path::new(&config.database_path))?
            .with_visibility_timeout(Duration::seconds(config.visibility_timeout_secs as i64))
            .with_max_attempts(config.max_attempts))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            visibility_timeout: Duration::minutes(5),
            max_attempts: 5,
        }
    }

    /// Sets how long a claimed task stays invisible before redelivery
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Sets how many unacknowledged deliveries a task gets before it is dropped
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn conn(&self) -> QueueResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Claims the earliest visible task of `kind`, leasing it
    ///
    /// Rows that already used up `max_attempts` deliveries and whose last
    /// lease has lapsed are deleted instead of being handed out again.
    pub fn claim(&self, kind: TaskKind, now: DateTime<Utc>) -> QueueResult<Option<Delivery>> {
        let now_ms = now.timestamp_millis();
        let lease_ms = (now + self.visibility_timeout).timestamp_millis();

        let claimed: Option<(i64, String, i64, u32)> = {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let dropped = tx.execute(
                "DELETE FROM tasks
                 WHERE kind = ?1 AND attempts >= ?2
                   AND leased_until IS NOT NULL AND leased_until <= ?3",
                params![kind.to_db_string(), self.max_attempts, now_ms],
            )?;
            if dropped > 0 {
                tracing::warn!(
                    kind = %kind,
                    dropped,
                    "Dropped tasks that exhausted {} deliveries",
                    self.max_attempts
                );
            }

            let row = tx
                .query_row(
                    "SELECT id, payload, not_before, attempts FROM tasks
                     WHERE kind = ?1 AND not_before <= ?2
                       AND (leased_until IS NULL OR leased_until <= ?2)
                     ORDER BY not_before, id
                     LIMIT 1",
                    params![kind.to_db_string(), now_ms],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            if let Some((id, _, _, _)) = &row {
                tx.execute(
                    "UPDATE tasks SET leased_until = ?1, attempts = attempts + 1 WHERE id = ?2",
                    params![lease_ms, id],
                )?;
            }

            tx.commit()?;
            row
        };

        match claimed {
            Some((id, payload, not_before, attempts)) => {
                let task: Task = serde_json::from_str(&payload)?;
                Ok(Some(Delivery {
                    id,
                    task,
                    not_before: from_millis(not_before),
                    attempts: attempts + 1,
                }))
            }
            None => Ok(None),
        }
    }

    /// Acknowledges a delivery, removing the task for good
    pub fn ack(&self, id: i64) -> QueueResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// True if a task of `kind` is visible at `now`
    pub fn has_visible(&self, kind: TaskKind, now: DateTime<Utc>) -> QueueResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM tasks
                WHERE kind = ?1 AND not_before <= ?2
                  AND (leased_until IS NULL OR leased_until <= ?2))",
            params![kind.to_db_string(), now.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Earliest time at which some task of `kind` becomes visible
    pub fn next_visible_at(&self, kind: TaskKind) -> QueueResult<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let next: Option<i64> = conn.query_row(
            "SELECT MIN(MAX(not_before, COALESCE(leased_until, 0)))
             FROM tasks WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(next.map(from_millis))
    }

    /// Number of queued tasks per kind, leased or not
    pub fn pending_counts(&self) -> QueueResult<Vec<(TaskKind, u64)>> {
        let conn = self.conn()?;
        let mut counts = Vec::with_capacity(TaskKind::ALL.len());
        for kind in TaskKind::ALL {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE kind = ?1",
                params![kind.to_db_string()],
                |row| row.get(0),
            )?;
            counts.push((kind, count as u64));
        }
        Ok(counts)
    }

    /// Every queued task, in visibility order
    pub fn pending(&self) -> QueueResult<Vec<Delivery>> {
        let rows: Vec<(i64, String, i64, u32)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, payload, not_before, attempts FROM tasks ORDER BY not_before, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, payload, not_before, attempts)| {
                Ok(Delivery {
                    id,
                    task: serde_json::from_str(&payload)?,
                    not_before: from_millis(not_before),
                    attempts,
                })
            })
            .collect()
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, task: Task, not_before: DateTime<Utc>) -> QueueResult<()> {
        let payload = serde_json::to_string(&task)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (kind, payload, not_before, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                task.kind().to_db_string(),
                payload,
                not_before.timestamp_millis(),
                Utc::now().timestamp_millis()
            ],
        )?;
        tracing::trace!(task = %task, not_before = %not_before, "Enqueued task");
        Ok(())
    }
}
