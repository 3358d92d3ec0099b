//! Execution outcome: the result shape the worker pool consumes.
//!
//! This module does not assume anything about what a task body means; it
//! only classifies how an execution ended so the pool can pick between a
//! terminal write and a retry.

use serde::{Deserialize, Serialize};

/// Result of running one task body.
///
/// - `Success`: terminal, the payload becomes the task's `output`.
/// - `TransientFailure`: the condition may clear; the task is rescheduled
///   with backoff instead of being completed.
/// - `FatalFailure`: terminal FAILED, the reason is recorded in `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success(serde_json::Value),
    TransientFailure(String),
    FatalFailure(String),
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self::Success(serde_json::Value::Null)
    }

    pub fn success_with(output: serde_json::Value) -> Self {
        Self::Success(output)
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::FatalFailure(reason.into())
    }
}
