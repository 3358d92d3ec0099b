//! Worker pool: bounded concurrent execution of claimed tasks.
//!
//! Each execution renews its lease on a fixed heartbeat interval while the
//! executor future runs. A negative heartbeat is the one and only
//! cancellation signal: the execution future is dropped on the spot and
//! nothing further is written for that task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::domain::{EventSink, ExecutionOutcome, Task, TaskEvent, TaskId, TaskState, WorkerId};
use crate::executor::{ClusterResolver, ExecutionContext, ExecutorRegistry};
use crate::retry::RetryPolicy;
use crate::store::TaskStore;

/// Bounded pool of execution slots shared by one dispatcher process.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    slots: Arc<Semaphore>,
    capacity: usize,
    worker_id: WorkerId,
    heartbeat_interval: Duration,
    retry: RetryPolicy,
    store: Arc<dyn TaskStore>,
    registry: Arc<ExecutorRegistry>,
    resolver: Arc<dyn ClusterResolver>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,

    /// Per-process retry attempt counts, keyed by task id. The durable row
    /// carries no attempt counter, so a dispatcher restart resets the
    /// backoff ladder for tasks it later re-claims.
    attempts: Mutex<HashMap<TaskId, u32>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        worker_id: WorkerId,
        store: Arc<dyn TaskStore>,
        registry: Arc<ExecutorRegistry>,
        resolver: Arc<dyn ClusterResolver>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Arc::new(Semaphore::new(config.worker_pool_size)),
                capacity: config.worker_pool_size,
                worker_id,
                heartbeat_interval: config.heartbeat_interval,
                retry,
                store,
                registry,
                resolver,
                events,
                clock,
                attempts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process identity leases are claimed and validated under.
    pub fn worker_id(&self) -> &WorkerId {
        &self.inner.worker_id
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots not currently executing. The dispatcher claims at most this
    /// many tasks per tick.
    pub fn free_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Start executing a claimed task. Returns false when no slot is free;
    /// the caller just leaves the task alone. Its lease will expire and
    /// some dispatcher will claim it again.
    pub fn submit(&self, task: Task) -> bool {
        let Ok(permit) = Arc::clone(&self.inner.slots).try_acquire_owned() else {
            return false;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_one(&inner, task).await;
            drop(permit);
        });
        true
    }

    /// Wait until every in-flight execution has finished.
    pub async fn drain(&self) {
        if let Ok(all) = self.inner.slots.acquire_many(self.inner.capacity as u32).await {
            drop(all);
        }
    }
}

impl PoolInner {
    async fn bump_attempts(&self, id: TaskId) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let n = attempts.entry(id).or_insert(0);
        *n += 1;
        *n
    }

    async fn forget_attempts(&self, id: TaskId) {
        self.attempts.lock().await.remove(&id);
    }
}

async fn run_one(pool: &PoolInner, task: Task) {
    let Some(executor) = pool.registry.get(&task.name) else {
        let output =
            serde_json::json!({ "error": format!("no executor registered for task '{}'", task.name) });
        finish(pool, &task, TaskState::Failed, output).await;
        return;
    };

    let ctx = ExecutionContext::new(task.cluster_name.clone(), Arc::clone(&pool.resolver));

    let mut heartbeat = tokio::time::interval(pool.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let execution = executor.execute(&task, &ctx);
    tokio::pin!(execution);

    // The first interval tick fires immediately, which doubles as the
    // Claimed -> Running transition.
    let outcome = loop {
        tokio::select! {
            outcome = &mut execution => break outcome,
            _ = heartbeat.tick() => {
                match pool.store.heartbeat(task.id, &pool.worker_id, pool.clock.now()).await {
                    Ok(true) => {}
                    Ok(false) => {
                        info!(task_id = %task.id, "lease lost, abandoning execution");
                        pool.forget_attempts(task.id).await;
                        return;
                    }
                    Err(err) => {
                        // Lease status unknown; keep executing and probe
                        // again next interval. If the store stays down the
                        // lease expires and another dispatcher takes over.
                        warn!(task_id = %task.id, error = %err, "heartbeat failed");
                    }
                }
            }
        }
    };

    match outcome {
        ExecutionOutcome::Success(output) => {
            finish(pool, &task, TaskState::Succeeded, output).await;
        }
        ExecutionOutcome::FatalFailure(reason) => {
            finish(pool, &task, TaskState::Failed, serde_json::json!({ "error": reason })).await;
        }
        ExecutionOutcome::TransientFailure(reason) => {
            let attempt = pool.bump_attempts(task.id).await;
            let delay = pool.retry.delay_for(attempt);
            match pool
                .store
                .schedule_retry(task.id, &pool.worker_id, delay, pool.clock.now())
                .await
            {
                Ok(true) => info!(
                    task_id = %task.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "transient failure, retry scheduled"
                ),
                Ok(false) => {
                    info!(task_id = %task.id, "lease lost before retry could be scheduled");
                    pool.forget_attempts(task.id).await;
                }
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "retry not recorded; lease expiry will requeue the task");
                }
            }
        }
    }
}

async fn finish(pool: &PoolInner, task: &Task, final_state: TaskState, output: serde_json::Value) {
    match pool
        .store
        .complete(task.id, &pool.worker_id, final_state, output.clone(), pool.clock.now())
        .await
    {
        Ok(true) => {
            pool.forget_attempts(task.id).await;
            pool.events
                .emit(TaskEvent {
                    task_id: task.id,
                    cluster_name: task.cluster_name.clone(),
                    final_state,
                    output: Some(output),
                })
                .await;
        }
        Ok(false) => {
            info!(task_id = %task.id, "stale completion dropped");
            pool.forget_attempts(task.id).await;
        }
        Err(err) => {
            warn!(task_id = %task.id, error = %err, "completion not recorded; lease expiry will requeue the task");
        }
    }
}
