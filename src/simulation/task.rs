// src/simulation/task.rs
//! One unit of simulated work, identified by its position in the work
//! sequence.

use crate::error::ArbiterError;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The unit does not exist. The cursor moves on.
    DataNotFound,
    /// The unit could not be reached. The same unit is retried after a backoff.
    TransientConnectivity,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::DataNotFound => f.write_str("data not found"),
            FailureKind::TransientConnectivity => f.write_str("transient connectivity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(String),
    RecoverableFailure { kind: FailureKind, detail: String },
    FatalFailure(String),
}

impl TaskOutcome {
    pub fn not_found(detail: impl Into<String>) -> Self {
        TaskOutcome::RecoverableFailure {
            kind: FailureKind::DataNotFound,
            detail: detail.into(),
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        TaskOutcome::RecoverableFailure {
            kind: FailureKind::TransientConnectivity,
            detail: detail.into(),
        }
    }
}

impl From<ArbiterError> for TaskOutcome {
    fn from(err: ArbiterError) -> Self {
        match err {
            ArbiterError::DataNotFound(detail) => TaskOutcome::not_found(detail),
            ArbiterError::TransientConnectivity(detail) | ArbiterError::Timeout(detail) => {
                TaskOutcome::unreachable(detail)
            }
            other => TaskOutcome::FatalFailure(other.to_string()),
        }
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, unit_id: u64) -> TaskOutcome;
}
