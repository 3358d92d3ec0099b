//! Process configuration.
//!
//! One immutable struct, constructed by the host at startup and passed to
//! the dispatcher and worker pool constructors. There is no global or
//! mutable configuration access anywhere in the crate. How the values are
//! loaded (file, environment, flags) is the host's business.

use std::time::Duration;

use crate::domain::ClusterName;
use crate::error::ConfigError;

/// A lease shorter than this many poll intervals risks reclaiming tasks
/// from dispatchers that are merely slow, not dead.
const MIN_POLLS_PER_LEASE: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// Parallel execution slots per dispatcher process.
    pub worker_pool_size: usize,

    /// How often the dispatcher loop polls the store for claimable work.
    pub dispatcher_poll_interval: Duration,

    /// How long a lease stays valid without a heartbeat before other
    /// dispatchers may reclaim the task.
    pub lease_timeout: Duration,

    /// How often a running execution renews its lease. Must be a small
    /// fraction of `lease_timeout` so a lost lease is observed promptly.
    pub heartbeat_interval: Duration,

    /// Clusters this process serves; tasks for other clusters are ignored.
    pub clusters: Vec<ClusterName>,
}

impl Default for Config {
    fn default() -> Self {
        let lease_timeout = Duration::from_secs(60);
        Self {
            worker_pool_size: 10,
            dispatcher_poll_interval: Duration::from_secs(10),
            lease_timeout,
            heartbeat_interval: lease_timeout / 4,
            clusters: Vec::new(),
        }
    }
}

impl Config {
    pub fn new(clusters: Vec<ClusterName>) -> Self {
        Self {
            clusters,
            ..Self::default()
        }
    }

    /// Fail-fast validation, called once at startup before anything spawns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.dispatcher_poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.lease_timeout < self.dispatcher_poll_interval * MIN_POLLS_PER_LEASE {
            return Err(ConfigError::LeaseTimeoutTooShort {
                lease_secs: self.lease_timeout.as_secs(),
                poll_secs: self.dispatcher_poll_interval.as_secs(),
                min_polls: MIN_POLLS_PER_LEASE,
            });
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.lease_timeout {
            return Err(ConfigError::BadHeartbeatInterval);
        }
        if self.clusters.is_empty() {
            return Err(ConfigError::NoClusters);
        }
        Ok(())
    }
}
