//! Error taxonomy.
//!
//! Losing a lease is deliberately *not* an error: heartbeat/complete return
//! `Ok(false)` and the executor aborts silently. The types here cover the
//! remaining cases: transient store outages (retried next cycle), invalid
//! configuration (fatal at startup only), duplicate executor registration,
//! and cluster-resolution failures.

use thiserror::Error;

use crate::domain::ClusterName;

/// Storage failure surfaced by a task store adapter.
///
/// Claim callers treat this as "no task obtained"; heartbeat/complete
/// callers treat it as "lease status unknown" and probe again. It never
/// terminates the dispatcher process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

/// Rejected at process startup; never surfaced mid-run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker pool size must be at least 1")]
    ZeroPoolSize,

    #[error("dispatcher poll interval must be nonzero")]
    ZeroPollInterval,

    #[error("lease timeout {lease_secs}s must cover at least {min_polls} poll intervals ({poll_secs}s each)")]
    LeaseTimeoutTooShort {
        lease_secs: u64,
        poll_secs: u64,
        min_polls: u32,
    },

    #[error("heartbeat interval must be nonzero and shorter than the lease timeout")]
    BadHeartbeatInterval,

    #[error("at least one cluster must be configured")]
    NoClusters,
}

/// Executor registration failure, startup-time only.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate executor for task name '{0}'")]
    DuplicateExecutor(String),
}

/// Cluster-directory lookup failure.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(ClusterName),

    #[error("cluster directory unavailable: {0}")]
    Unavailable(String),
}
