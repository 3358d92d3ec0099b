//! Task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task.
///
/// Transitions:
/// - Pending -> Claimed -> Running -> Succeeded | Failed
/// - Pending | expired-lease Claimed/Running -> Aborted (administrative)
/// - Claimed | Running -> Pending (retry with backoff)
/// - Claimed | Running -> Claimed (re-claim after the lease expired)
///
/// A Claimed/Running task whose lease has expired is *claim-eligible* again,
/// but its stored state is only rewritten when the next claim commits. That
/// eligibility is a computed predicate (see [`Task::claim_eligible`]), never
/// a separate stored flag.
///
/// [`Task::claim_eligible`]: super::Task::claim_eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting to be claimed (initial state, and the state after a retry).
    Pending,

    /// A worker holds the lease but has not heartbeat yet.
    Claimed,

    /// Under execution; the lease holder heartbeats `last_alive_at`.
    Running,

    /// Terminal: the operation completed.
    Succeeded,

    /// Terminal: the operation failed fatally.
    Failed,

    /// Terminal: cancelled administratively.
    Aborted,
}

impl TaskState {
    /// Is this a terminal state (no further automatic transition)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Aborted
        )
    }

    /// Does a worker currently appear to hold this task?
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Claimed | TaskState::Running)
    }

    /// Whether moving to `next` is a legal transition. Store adapters guard
    /// every write with this; anything else is a programming error and is
    /// rejected rather than applied.
    pub fn can_transition(self, next: TaskState) -> bool {
        match self {
            TaskState::Pending => matches!(next, TaskState::Claimed | TaskState::Aborted),
            // Retry back to Pending, re-claim, heartbeat to Running, or any
            // terminal outcome: every state is reachable from an active one.
            TaskState::Claimed | TaskState::Running => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Claimed => "CLAIMED",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}
