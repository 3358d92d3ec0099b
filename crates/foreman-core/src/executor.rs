//! Execution interface: the seam between the queue and the code that
//! actually operates on storage clusters.
//!
//! The queue never parses a task body. It resolves an executor by task
//! name, hands it the task plus an [`ExecutionContext`], and classifies
//! the returned [`ExecutionOutcome`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ClusterName, ExecutionOutcome, Task};
use crate::error::{RegistryError, ResolveError};

/// One task-type implementation.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, ctx: &ExecutionContext) -> ExecutionOutcome;
}

/// Registry of executors (task name -> executor).
///
/// Design:
/// - Built during initialization (mutable), used during runtime
///   (immutable). This avoids locks and keeps lookup cheap.
/// - Duplicate registration is a startup error, not last-wins.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.executors.contains_key(&name) {
            return Err(RegistryError::DuplicateExecutor(name));
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// What an executor gets besides the task row itself: the cluster it is
/// operating on and the directory that maps the cluster to live endpoints.
pub struct ExecutionContext {
    cluster: ClusterName,
    resolver: Arc<dyn ClusterResolver>,
}

impl ExecutionContext {
    pub fn new(cluster: ClusterName, resolver: Arc<dyn ClusterResolver>) -> Self {
        Self { cluster, resolver }
    }

    pub fn cluster(&self) -> &ClusterName {
        &self.cluster
    }

    /// Endpoints of the cluster this task targets.
    pub async fn endpoints(&self) -> Result<Vec<String>, ResolveError> {
        self.resolver.resolve(&self.cluster).await
    }
}

/// Cluster-discovery port: symbolic cluster name -> network endpoints.
/// The backing directory (ZooKeeper or otherwise) is a host concern.
#[async_trait]
pub trait ClusterResolver: Send + Sync {
    async fn resolve(&self, cluster: &ClusterName) -> Result<Vec<String>, ResolveError>;
}

/// Fixed-map resolver for tests and demo hosts.
pub struct StaticClusterResolver {
    endpoints: HashMap<ClusterName, Vec<String>>,
}

impl StaticClusterResolver {
    pub fn new(entries: impl IntoIterator<Item = (ClusterName, Vec<String>)>) -> Self {
        Self {
            endpoints: entries.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ClusterResolver for StaticClusterResolver {
    async fn resolve(&self, cluster: &ClusterName) -> Result<Vec<String>, ResolveError> {
        self.endpoints
            .get(cluster)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownCluster(cluster.clone()))
    }
}
