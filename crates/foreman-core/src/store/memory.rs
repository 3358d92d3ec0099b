//! In-memory task store.
//!
//! The reference implementation of the store port, used by tests and demo
//! hosts. One mutex guards the whole row map, which makes every operation
//! trivially atomic per row; a relational adapter gets the same guarantees
//! from single-row compare-and-set updates instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{TaskCounts, TaskStore, claim_order};
use crate::clock::shift;
use crate::domain::{ClusterName, NewTask, Task, TaskId, TaskState, WorkerId};
use crate::error::StoreError;

pub struct MemoryTaskStore {
    rows: Mutex<HashMap<TaskId, Task>>,
    lease_timeout: Duration,
}

impl MemoryTaskStore {
    pub fn new(lease_timeout: Duration) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            lease_timeout,
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, new_task: NewTask, now: DateTime<Utc>) -> Result<TaskId, StoreError> {
        let id = TaskId::generate();
        let task = Task {
            id,
            name: new_task.name,
            priority: new_task.priority,
            state: TaskState::Pending,
            cluster_name: new_task.cluster_name,
            body: new_task.body,
            created_at: now,
            // run_after never precedes created_at
            run_after: new_task.run_after.map_or(now, |t| t.max(now)),
            last_alive_at: now,
            claimed_worker: None,
            output: None,
        };
        self.rows.lock().await.insert(id, task);
        Ok(id)
    }

    async fn try_claim(
        &self,
        cluster: &ClusterName,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        let mut rows = self.rows.lock().await;

        let best = rows
            .values()
            .filter(|t| t.cluster_name == *cluster && t.claim_eligible(now, self.lease_timeout))
            .min_by(|a, b| claim_order(a, b))
            .map(|t| t.id);

        let Some(id) = best else {
            return Ok(None);
        };

        // Still holding the lock, so nobody else can have claimed it since
        // the scan: this is the atomic first-committer-wins update.
        let Some(task) = rows.get_mut(&id) else {
            return Ok(None);
        };
        task.state = TaskState::Claimed;
        task.claimed_worker = Some(worker.clone());
        task.last_alive_at = now;
        Ok(Some(task.clone()))
    }

    async fn heartbeat(
        &self,
        id: TaskId,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let Some(task) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if task.claimed_worker.as_ref() != Some(worker)
            || !task.state.can_transition(TaskState::Running)
        {
            return Ok(false);
        }
        task.last_alive_at = now;
        task.state = TaskState::Running;
        Ok(true)
    }

    async fn complete(
        &self,
        id: TaskId,
        worker: &WorkerId,
        final_state: TaskState,
        output: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Only Succeeded/Failed come through here; Aborted has its own path.
        if !matches!(final_state, TaskState::Succeeded | TaskState::Failed) {
            return Ok(false);
        }
        let mut rows = self.rows.lock().await;
        let Some(task) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if task.claimed_worker.as_ref() != Some(worker)
            || !task.state.can_transition(final_state)
        {
            return Ok(false);
        }
        task.state = final_state;
        task.output = Some(output);
        task.last_alive_at = now;
        Ok(true)
    }

    async fn schedule_retry(
        &self,
        id: TaskId,
        worker: &WorkerId,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let Some(task) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if task.claimed_worker.as_ref() != Some(worker)
            || !task.state.can_transition(TaskState::Pending)
        {
            return Ok(false);
        }
        task.state = TaskState::Pending;
        task.claimed_worker = None;
        task.run_after = shift(now, delay);
        Ok(true)
    }

    async fn abort(
        &self,
        id: TaskId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let Some(task) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if task.state.is_terminal() {
            return Ok(false);
        }
        // An unexpired lease belongs to a live worker; aborting under it
        // would race that worker's terminal write.
        if task.state.is_active() && !task.lease_expired(now, self.lease_timeout) {
            return Ok(false);
        }
        task.state = TaskState::Aborted;
        task.claimed_worker = None;
        task.output = Some(serde_json::json!({ "aborted": reason }));
        Ok(true)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn counts(&self, cluster: Option<&ClusterName>) -> Result<TaskCounts, StoreError> {
        let rows = self.rows.lock().await;
        let mut counts = TaskCounts::default();
        for task in rows.values() {
            if let Some(cluster) = cluster
                && task.cluster_name != *cluster
            {
                continue;
            }
            match task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Claimed => counts.claimed += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Aborted => counts.aborted += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    const LEASE: Duration = Duration::from_secs(60);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn cluster() -> ClusterName {
        ClusterName::new("user-data")
    }

    fn store() -> MemoryTaskStore {
        MemoryTaskStore::new(LEASE)
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[tokio::test]
    async fn insert_creates_pending_row() {
        let store = store();
        let id = store
            .insert(
                NewTask::new("rebalance", cluster()).with_body(serde_json::json!({"shard": 7})),
                t0(),
            )
            .await
            .unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.created_at, t0());
        assert_eq!(task.run_after, t0());
        assert_eq!(task.claimed_worker, None);
        assert_eq!(task.body["shard"], 7);
    }

    #[tokio::test]
    async fn insert_clamps_run_after_to_creation_time() {
        let store = store();
        let id = store
            .insert(
                NewTask::new("restore", cluster()).not_before(t0() - secs(3600)),
                t0(),
            )
            .await
            .unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.run_after, t0());
    }

    #[tokio::test]
    async fn claim_sets_lease_fields() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();

        let claimed = store
            .try_claim(&cluster(), &worker, t0() + secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.state, TaskState::Claimed);
        assert_eq!(claimed.claimed_worker, Some(worker));
        assert_eq!(claimed.last_alive_at, t0() + secs(1));
    }

    #[tokio::test]
    async fn claim_respects_cluster_partition() {
        let store = store();
        store
            .insert(NewTask::new("rebalance", ClusterName::new("other")), t0())
            .await
            .unwrap();

        let got = store
            .try_claim(&cluster(), &WorkerId::new("w1"), t0() + secs(1))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn claim_skips_deferred_tasks() {
        let store = store();
        store
            .insert(
                NewTask::new("rebalance", cluster()).not_before(t0() + secs(300)),
                t0(),
            )
            .await
            .unwrap();

        let worker = WorkerId::new("w1");
        assert!(
            store
                .try_claim(&cluster(), &worker, t0() + secs(299))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .try_claim(&cluster(), &worker, t0() + secs(300))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_age_then_id() {
        let store = store();
        let a = store
            .insert(NewTask::new("a", cluster()).with_priority(5), t0())
            .await
            .unwrap();
        let b = store
            .insert(NewTask::new("b", cluster()).with_priority(10), t0() + secs(10))
            .await
            .unwrap();
        let c = store
            .insert(NewTask::new("c", cluster()).with_priority(10), t0())
            .await
            .unwrap();

        let worker = WorkerId::new("w1");
        let now = t0() + secs(20);
        let first = store.try_claim(&cluster(), &worker, now).await.unwrap().unwrap();
        let second = store.try_claim(&cluster(), &worker, now).await.unwrap().unwrap();
        let third = store.try_claim(&cluster(), &worker, now).await.unwrap().unwrap();

        assert_eq!(first.id, c, "highest priority, earliest created_at wins");
        assert_eq!(second.id, b);
        assert_eq!(third.id, a);
    }

    #[tokio::test]
    async fn equal_rows_tie_break_on_id_ascending() {
        let store = store();
        let x = store.insert(NewTask::new("x", cluster()), t0()).await.unwrap();
        let y = store.insert(NewTask::new("y", cluster()), t0()).await.unwrap();
        let mut expected = [x, y];
        expected.sort();

        let worker = WorkerId::new("w1");
        let now = t0() + secs(1);
        let first = store.try_claim(&cluster(), &worker, now).await.unwrap().unwrap();
        let second = store.try_claim(&cluster(), &worker, now).await.unwrap().unwrap();

        assert_eq!([first.id, second.id], expected);
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let store = Arc::new(store());
        store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();

        let mut joins = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move {
                store
                    .try_claim(&ClusterName::new("user-data"), &WorkerId::new(format!("w{i}")), t0() + secs(1))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for join in joins {
            if join.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable_without_state_rewrite() {
        let store = store();
        let w1 = WorkerId::new("w1");
        let w2 = WorkerId::new("w2");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();

        store.try_claim(&cluster(), &w1, t0() + secs(1)).await.unwrap().unwrap();

        // Within the lease window the row stays off-limits.
        let before_expiry = t0() + secs(1) + secs(60);
        assert!(store.try_claim(&cluster(), &w2, before_expiry).await.unwrap().is_none());

        // The stored state still reads Claimed; eligibility is computed.
        assert_eq!(store.get(id).await.unwrap().unwrap().state, TaskState::Claimed);

        let after_expiry = t0() + secs(1) + secs(61);
        let reclaimed = store
            .try_claim(&cluster(), &w2, after_expiry)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.claimed_worker, Some(w2));
        assert_eq!(reclaimed.last_alive_at, after_expiry);
    }

    #[tokio::test]
    async fn heartbeat_renews_lease_and_marks_running() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();
        store.try_claim(&cluster(), &worker, t0()).await.unwrap().unwrap();

        assert!(store.heartbeat(id, &worker, t0() + secs(5)).await.unwrap());

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.last_alive_at, t0() + secs(5));
    }

    #[tokio::test]
    async fn stale_worker_cannot_heartbeat_or_complete() {
        let store = store();
        let w1 = WorkerId::new("w1");
        let w2 = WorkerId::new("w2");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();

        store.try_claim(&cluster(), &w1, t0()).await.unwrap().unwrap();
        // w1 goes silent; w2 reclaims after expiry.
        store
            .try_claim(&cluster(), &w2, t0() + secs(61))
            .await
            .unwrap()
            .unwrap();

        let late = t0() + secs(62);
        assert!(!store.heartbeat(id, &w1, late).await.unwrap());
        assert!(
            !store
                .complete(id, &w1, TaskState::Succeeded, serde_json::json!({}), late)
                .await
                .unwrap()
        );
        assert!(
            !store
                .schedule_retry(id, &w1, Duration::from_secs(10), late)
                .await
                .unwrap()
        );

        // The row still belongs to w2, untouched by the stale calls.
        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.claimed_worker, Some(w2));
        assert_eq!(task.state, TaskState::Claimed);
        assert_eq!(task.output, None);
    }

    #[tokio::test]
    async fn complete_writes_output_once() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();
        store.try_claim(&cluster(), &worker, t0()).await.unwrap().unwrap();

        assert!(
            store
                .complete(
                    id,
                    &worker,
                    TaskState::Succeeded,
                    serde_json::json!({"moved": 12}),
                    t0() + secs(30),
                )
                .await
                .unwrap()
        );

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.output, Some(serde_json::json!({"moved": 12})));

        // Terminal rows reject further writes.
        assert!(
            !store
                .complete(id, &worker, TaskState::Failed, serde_json::json!({}), t0() + secs(31))
                .await
                .unwrap()
        );
        assert!(!store.heartbeat(id, &worker, t0() + secs(31)).await.unwrap());
    }

    #[tokio::test]
    async fn complete_rejects_non_terminal_states() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();
        store.try_claim(&cluster(), &worker, t0()).await.unwrap().unwrap();

        assert!(
            !store
                .complete(id, &worker, TaskState::Running, serde_json::json!({}), t0())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn schedule_retry_releases_and_defers() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();
        store.try_claim(&cluster(), &worker, t0()).await.unwrap().unwrap();

        assert!(
            store
                .schedule_retry(id, &worker, Duration::from_secs(120), t0() + secs(10))
                .await
                .unwrap()
        );

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.claimed_worker, None);
        assert_eq!(task.run_after, t0() + secs(130));

        // Not claimable until the backoff elapses.
        let other = WorkerId::new("w2");
        assert!(store.try_claim(&cluster(), &other, t0() + secs(129)).await.unwrap().is_none());
        assert!(store.try_claim(&cluster(), &other, t0() + secs(130)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn abort_refused_under_active_lease() {
        let store = store();
        let worker = WorkerId::new("w1");
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();
        store.try_claim(&cluster(), &worker, t0()).await.unwrap().unwrap();

        assert!(!store.abort(id, "operator request", t0() + secs(30)).await.unwrap());

        // Once the lease expires the abort goes through.
        assert!(store.abort(id, "operator request", t0() + secs(61)).await.unwrap());
        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Aborted);
        assert_eq!(task.output, Some(serde_json::json!({"aborted": "operator request"})));

        // And the stale holder can no longer touch the row.
        assert!(!store.heartbeat(id, &worker, t0() + secs(62)).await.unwrap());
    }

    #[tokio::test]
    async fn abort_pending_task() {
        let store = store();
        let id = store
            .insert(NewTask::new("rebalance", cluster()), t0())
            .await
            .unwrap();

        assert!(store.abort(id, "superseded", t0() + secs(1)).await.unwrap());
        assert!(!store.abort(id, "again", t0() + secs(2)).await.unwrap());
    }

    #[tokio::test]
    async fn counts_by_state_and_cluster() {
        let store = store();
        let worker = WorkerId::new("w1");
        store.insert(NewTask::new("a", cluster()), t0()).await.unwrap();
        store.insert(NewTask::new("b", cluster()), t0()).await.unwrap();
        store
            .insert(NewTask::new("c", ClusterName::new("other")), t0())
            .await
            .unwrap();

        store.try_claim(&cluster(), &worker, t0() + secs(1)).await.unwrap().unwrap();

        let counts = store.counts(Some(&cluster())).await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.claimed, 1);
        assert_eq!(counts.in_flight(), 2);

        let all = store.counts(None).await.unwrap();
        assert_eq!(all.pending, 2);
    }
}
