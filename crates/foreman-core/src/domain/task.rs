//! Task row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ClusterName, TaskId, TaskState, WorkerId};

/// One task row in the shared store.
///
/// Design:
/// - The row is the single source of truth; dispatchers coordinate only
///   through atomic per-row updates on it.
/// - `body` is opaque to the queue; only the executing worker interprets it.
/// - `output` is written exactly once, on the terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Human-readable label; also selects the executor implementation.
    pub name: String,

    /// Higher value is claimed first.
    pub priority: i32,

    pub state: TaskState,

    pub cluster_name: ClusterName,

    /// Opaque payload for the executing worker.
    pub body: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// Earliest instant the task is claimable; advanced on retry backoff.
    pub run_after: DateTime<Utc>,

    /// Heartbeat timestamp; freshness against the lease timeout decides
    /// whether the current claimant is still alive.
    pub last_alive_at: DateTime<Utc>,

    /// Current lease holder, if any.
    pub claimed_worker: Option<WorkerId>,

    /// Result payload or error detail, written on the terminal transition.
    pub output: Option<serde_json::Value>,
}

impl Task {
    /// Has the current lease gone stale?
    ///
    /// A `last_alive_at` in the future (clock skew between instances) counts
    /// as alive; expiry only ever moves forward.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        match (now - self.last_alive_at).to_std() {
            Ok(age) => age > lease_timeout,
            Err(_) => false,
        }
    }

    /// The claim-eligibility predicate at the heart of the protocol.
    ///
    /// Eligibility is computed over stored fields rather than kept as a
    /// separate flag, so there is no window in which two writers can both
    /// believe they hold a fresh lease: the atomic claim update is the
    /// single source of truth.
    pub fn claim_eligible(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        if self.run_after > now {
            return false;
        }
        match self.state {
            TaskState::Pending => true,
            TaskState::Claimed | TaskState::Running => self.lease_expired(now, lease_timeout),
            _ => false,
        }
    }
}

/// Producer-side description of a task to insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub priority: i32,
    pub cluster_name: ClusterName,
    pub body: serde_json::Value,
    /// Defer the first claim until this instant. Clamped so `run_after`
    /// never precedes `created_at`.
    pub run_after: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, cluster_name: ClusterName) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            cluster_name,
            body: serde_json::Value::Null,
            run_after: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn not_before(mut self, run_after: DateTime<Utc>) -> Self {
        self.run_after = Some(run_after);
        self
    }
}
