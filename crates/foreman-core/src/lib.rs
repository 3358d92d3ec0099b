//! foreman-core
//!
//! A distributed dispatch queue for storage-cluster maintenance tasks.
//! Any number of dispatcher processes poll one shared durable task store,
//! atomically claim work, execute it on a bounded local worker pool, and
//! coordinate exclusively through lease timestamps on the task rows.
//! No consensus protocol, no leader.
//!
//! Modules:
//! - **domain**: the task row, its state machine, ids, outcomes, events
//! - **store**: the task store port and the in-memory reference adapter
//! - **dispatcher**: the per-process polling loop
//! - **worker**: the bounded pool that executes and heartbeats
//! - **executor**: the seam to host-supplied task implementations
//! - **config**, **clock**, **retry**, **error**: the supporting pieces

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod executor;
pub mod retry;
pub mod store;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use domain::{
    ClusterName, EventSink, ExecutionOutcome, LogEventSink, MemoryEventSink, NewTask, Task,
    TaskEvent, TaskId, TaskState, WorkerId,
};
pub use error::{ConfigError, RegistryError, ResolveError, StoreError};
pub use executor::{
    ClusterResolver, ExecutionContext, ExecutorRegistry, StaticClusterResolver, TaskExecutor,
};
pub use retry::RetryPolicy;
pub use store::{MemoryTaskStore, TaskCounts, TaskStore};
pub use worker::WorkerPool;
