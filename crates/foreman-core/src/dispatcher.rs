//! Dispatcher loop: polls the store and feeds the worker pool.
//!
//! Many dispatcher processes run against the same store with no awareness
//! of each other; the claim protocol is the only coordination between
//! them. Within one process the loop is a plain fixed-interval tick that
//! never lets an error escape.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::domain::ClusterName;
use crate::store::TaskStore;
use crate::worker::WorkerPool;

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    pool: WorkerPool,
    clock: Arc<dyn Clock>,
    clusters: Vec<ClusterName>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        store: Arc<dyn TaskStore>,
        pool: WorkerPool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            pool,
            clock,
            clusters: config.clusters.clone(),
            poll_interval: config.dispatcher_poll_interval,
        }
    }

    /// Start polling. The returned handle stops the loop; in-flight
    /// executions keep their leases until the pool is drained separately.
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        DispatcherHandle { shutdown_tx, join }
    }

    async fn run(self, shutdown_rx: &mut watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll cycle: claim up to the pool's free slots per cluster and
    /// hand everything claimed to the pool. Never blocks on a full pool
    /// and never propagates a store failure.
    async fn tick(&self) {
        for cluster in &self.clusters {
            while self.pool.free_slots() > 0 {
                match self
                    .store
                    .try_claim(cluster, self.pool.worker_id(), self.clock.now())
                    .await
                {
                    Ok(Some(task)) => {
                        debug!(task_id = %task.id, cluster = %cluster, "claimed task");
                        if !self.pool.submit(task) {
                            // Lost the slot to a concurrent submit; the
                            // untouched lease will expire and be reclaimed.
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(cluster = %cluster, error = %err, "claim failed, retrying next poll");
                        return;
                    }
                }
            }
        }
    }
}

/// Handle to a spawned dispatcher loop.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Ask the loop to stop after the current tick.
    pub fn request_shutdown(&self) {
        // send fails only when the loop is already gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
