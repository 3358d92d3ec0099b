//! Demo host: runs one dispatcher against the in-memory store.
//!
//! Two executors are registered: a shard rebalance that succeeds after
//! touching the cluster directory, and a shard restore that fails
//! transiently a couple of times first, to show the backoff path.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use foreman_core::{
    Clock, ClusterName, Config, Dispatcher, ExecutionContext, ExecutionOutcome, ExecutorRegistry,
    LogEventSink, MemoryTaskStore, NewTask, RetryPolicy, StaticClusterResolver, SystemClock, Task,
    TaskExecutor, TaskStore, WorkerId, WorkerPool,
};

#[derive(Debug, Deserialize)]
struct ShardPayload {
    shard: u32,
}

struct RebalanceExecutor;

#[async_trait]
impl TaskExecutor for RebalanceExecutor {
    async fn execute(&self, task: &Task, ctx: &ExecutionContext) -> ExecutionOutcome {
        let payload: ShardPayload = match serde_json::from_value(task.body.clone()) {
            Ok(p) => p,
            Err(e) => return ExecutionOutcome::fatal(format!("bad payload: {e}")),
        };
        let endpoints = match ctx.endpoints().await {
            Ok(e) => e,
            Err(e) => return ExecutionOutcome::transient(e.to_string()),
        };
        info!(shard = payload.shard, targets = endpoints.len(), "rebalancing shard");
        sleep(Duration::from_millis(300)).await;
        ExecutionOutcome::success_with(serde_json::json!({
            "shard": payload.shard,
            "moved_to": endpoints.first(),
        }))
    }
}

struct RestoreExecutor {
    remaining_failures: AtomicU32,
}

impl RestoreExecutor {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl TaskExecutor for RestoreExecutor {
    async fn execute(&self, task: &Task, _ctx: &ExecutionContext) -> ExecutionOutcome {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return ExecutionOutcome::transient(format!("backup not ready yet (left={left})"));
        }
        info!(task = %task.name, "restore finished");
        ExecutionOutcome::success()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cluster = ClusterName::new("user-data");
    let config = Config {
        worker_pool_size: 4,
        dispatcher_poll_interval: Duration::from_millis(200),
        lease_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_millis(500),
        clusters: vec![cluster.clone()],
    };
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    }

    let store = Arc::new(MemoryTaskStore::new(config.lease_timeout));
    let clock = Arc::new(SystemClock);

    let mut registry = ExecutorRegistry::new();
    registry
        .register("rebalance-shard", Arc::new(RebalanceExecutor))
        .expect("fresh registry");
    registry
        .register("restore-shard", Arc::new(RestoreExecutor::new(2)))
        .expect("fresh registry");

    let resolver = Arc::new(StaticClusterResolver::new([(
        cluster.clone(),
        vec!["10.0.0.1:9090".to_string(), "10.0.0.2:9090".to_string()],
    )]));

    let pool = WorkerPool::new(
        &config,
        WorkerId::generate("demo-host"),
        store.clone(),
        Arc::new(registry),
        resolver,
        Arc::new(LogEventSink),
        clock.clone(),
        RetryPolicy {
            base_delay: Duration::from_millis(400),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        },
    );

    let handle = Dispatcher::new(&config, store.clone(), pool.clone(), clock.clone()).spawn();

    for shard in 0..3 {
        let id = store
            .insert(
                NewTask::new("rebalance-shard", cluster.clone())
                    .with_priority(5)
                    .with_body(serde_json::json!({ "shard": shard })),
                clock.now(),
            )
            .await
            .expect("in-memory insert");
        info!(%id, shard, "enqueued rebalance");
    }
    let restore_id = store
        .insert(
            NewTask::new("restore-shard", cluster.clone()).with_priority(10),
            clock.now(),
        )
        .await
        .expect("in-memory insert");
    info!(%restore_id, "enqueued restore (will fail twice before succeeding)");

    // Wait for everything to reach a terminal state, then report.
    loop {
        let counts = store.counts(Some(&cluster)).await.expect("in-memory counts");
        if counts.in_flight() == 0 {
            info!(?counts, "all tasks terminal");
            break;
        }
        sleep(Duration::from_millis(200)).await;
    }

    handle.shutdown_and_join().await;
    pool.drain().await;
}
