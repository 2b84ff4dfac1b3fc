// src/compute/mod.rs
//! Provider control plane: start/stop an instance and run commands on it.
//! Both are asynchronous on the provider side, so callers poll.

pub mod dry_run;

pub use dry_run::DryRunController;

use crate::error::{ArbiterError, Result};
use crate::pricing::ProviderId;
use crate::utils::{poll_until, Clock, PollOutcome};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderState {
    Running,
    Stopped,
    Transitioning,
    Unknown,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderState::Running => "running",
            ProviderState::Stopped => "stopped",
            ProviderState::Transitioning => "transitioning",
            ProviderState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Handle for a command submitted to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Success(String),
    Failed(String),
}

/// One implementation per provider SDK. Every call returns as soon as the
/// provider has accepted the request.
#[async_trait]
pub trait ComputeController: Send + Sync {
    fn name(&self) -> &str;

    async fn activate(&self, provider: &ProviderId) -> Result<()>;

    async fn deactivate(&self, provider: &ProviderId) -> Result<()>;

    async fn state(&self, provider: &ProviderId) -> Result<ProviderState>;

    async fn submit_command(&self, provider: &ProviderId, command: &str) -> Result<CommandId>;

    async fn command_status(&self, provider: &ProviderId, id: &CommandId) -> Result<CommandStatus>;
}

/// Waits until `provider` reports `target`. Returns `false` on timeout.
pub async fn wait_for_state(
    controller: &dyn ComputeController,
    clock: &dyn Clock,
    provider: &ProviderId,
    target: ProviderState,
    interval: Duration,
    timeout: Duration,
) -> Result<bool> {
    let outcome = poll_until(clock, interval, timeout, || async move {
        let state = controller.state(provider).await?;
        debug!("{} is {}", provider, state);
        Ok((state == target).then_some(()))
    })
    .await?;
    Ok(matches!(outcome, PollOutcome::Ready(())))
}

/// Submits `command` and polls it to a terminal status.
pub async fn run_command(
    controller: &dyn ComputeController,
    clock: &dyn Clock,
    provider: &ProviderId,
    command: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<String> {
    let id = controller.submit_command(provider, command).await?;
    info!("Submitted command {} to {}", id, provider);

    let outcome = poll_until(clock, interval, timeout, || {
        let id = &id;
        async move {
            match controller.command_status(provider, id).await? {
                CommandStatus::Success(output) => Ok(Some(Ok(output))),
                CommandStatus::Failed(reason) => Ok(Some(Err(reason))),
                CommandStatus::Pending | CommandStatus::InProgress => Ok(None),
            }
        }
    })
    .await?;

    match outcome {
        PollOutcome::Ready(Ok(output)) => Ok(output),
        PollOutcome::Ready(Err(reason)) => {
            warn!("Command {} on {} failed: {}", id, provider, reason);
            Err(ArbiterError::CommandFailed(format!("{} on {}: {}", id, provider, reason)))
        }
        PollOutcome::TimedOut => Err(ArbiterError::Timeout(format!(
            "command {} on {} did not finish within {:?}",
            id, provider, timeout
        ))),
    }
}
