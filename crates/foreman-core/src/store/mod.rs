//! Task store port.
//!
//! The durable store is the only shared mutable resource in the system;
//! every operation here must be atomic with respect to concurrent callers
//! on the same row. No multi-row transactions are required; cross-task
//! atomicity is traded away for simplicity.

mod memory;

pub use memory::MemoryTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

use crate::domain::{ClusterName, NewTask, Task, TaskId, TaskState, WorkerId};
use crate::error::StoreError;

/// Port over the durable task store.
///
/// Mutual exclusion lives entirely in these operations: `try_claim` is
/// first-committer-wins, and `heartbeat`/`complete`/`schedule_retry` are
/// conditional on the caller still being the recorded lease holder. A
/// `false` return means the lease was lost and the caller must not proceed.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task in Pending state and return its id.
    async fn insert(&self, new_task: NewTask, now: DateTime<Utc>) -> Result<TaskId, StoreError>;

    /// Atomically claim the best eligible task for `cluster`, if any.
    ///
    /// Eligible: Pending, or Claimed/Running with an expired lease, with
    /// `run_after <= now`. Ordered by priority descending, then creation
    /// time ascending, then id ascending. On success the row reads
    /// `state = Claimed`, `claimed_worker = worker`, `last_alive_at = now`.
    async fn try_claim(
        &self,
        cluster: &ClusterName,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError>;

    /// Renew the lease and mark the task Running. `Ok(false)` means the
    /// lease is no longer held; the caller must abort execution immediately.
    async fn heartbeat(
        &self,
        id: TaskId,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Terminal transition plus the one-shot `output` write, applied only
    /// while the lease is still held. Stale completions are dropped.
    async fn complete(
        &self,
        id: TaskId,
        worker: &WorkerId,
        final_state: TaskState,
        output: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Release the task back to Pending with `run_after = now + delay`,
    /// applied only while the lease is still held.
    async fn schedule_retry(
        &self,
        id: TaskId,
        worker: &WorkerId,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Administrative terminal Aborted. Refused while an unexpired lease is
    /// active, since the holder would otherwise keep writing to a dead row.
    async fn abort(
        &self,
        id: TaskId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Point read, for hosts and tests.
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Per-state counts, optionally scoped to one cluster.
    async fn counts(&self, cluster: Option<&ClusterName>) -> Result<TaskCounts, StoreError>;
}

/// Claim order: priority descending, creation time ascending, id ascending.
///
/// The id tie-break keeps selection deterministic when two tasks are created
/// within the same instant. Any store adapter should order candidates this
/// way (in SQL: `ORDER BY priority DESC, created_at ASC, id ASC`).
pub fn claim_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Per-state row counts for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub claimed: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl TaskCounts {
    /// Tasks that have not reached a terminal state yet.
    pub fn in_flight(&self) -> usize {
        self.pending + self.claimed + self.running
    }
}
