//! Terminal-transition events and the sink port consumed by alerting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use super::{ClusterName, TaskId, TaskState};

/// Emitted once for every terminal transition the pool performs.
///
/// Alerting/notification transport is a host concern; the queue only
/// produces the structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub cluster_name: ClusterName,
    pub final_state: TaskState,
    pub output: Option<serde_json::Value>,
}

/// Sink port for terminal events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: TaskEvent);
}

/// Sink that logs each event. The default for hosts without alerting.
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn emit(&self, event: TaskEvent) {
        info!(
            task_id = %event.task_id,
            cluster = %event.cluster_name,
            state = %event.final_state,
            "task reached terminal state"
        );
    }
}

/// Collecting sink for tests and host-side polling.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything emitted so far.
    pub async fn drain(&self) -> Vec<TaskEvent> {
        let mut events = self.events.lock().await;
        std::mem::take(&mut *events)
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: TaskEvent) {
        self.events.lock().await.push(event);
    }
}
