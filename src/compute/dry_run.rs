// src/compute/dry_run.rs
//! Controller that only tracks state locally. Used by `simulate` when no
//! provider SDK is wired in, and by tests.

use super::{CommandId, CommandStatus, ComputeController, ProviderState};
use crate::error::Result;
use crate::pricing::ProviderId;
use async_trait::async_trait;
use dashmap::DashMap;
use log::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Tracked {
    state: ProviderState,
    /// State queries left before a pending transition settles.
    settle_in: u32,
    target: ProviderState,
}

#[derive(Debug, Default)]
pub struct DryRunController {
    /// How many `state` calls a start/stop stays in `Transitioning`.
    transition_polls: u32,
    providers: DashMap<ProviderId, Tracked>,
    commands: DashMap<CommandId, (ProviderId, String)>,
}

impl DryRunController {
    pub fn new(transition_polls: u32) -> Self {
        Self {
            transition_polls,
            ..Self::default()
        }
    }

    fn transition(&self, provider: &ProviderId, target: ProviderState) {
        let mut entry = self.providers.entry(provider.clone()).or_insert(Tracked {
            state: ProviderState::Stopped,
            settle_in: 0,
            target: ProviderState::Stopped,
        });
        if entry.state == target && entry.settle_in == 0 {
            return;
        }
        entry.target = target;
        entry.settle_in = self.transition_polls;
        entry.state = if self.transition_polls == 0 {
            target
        } else {
            ProviderState::Transitioning
        };
    }
}

#[async_trait]
impl ComputeController for DryRunController {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn activate(&self, provider: &ProviderId) -> Result<()> {
        info!("[dry-run] start {}", provider);
        self.transition(provider, ProviderState::Running);
        Ok(())
    }

    async fn deactivate(&self, provider: &ProviderId) -> Result<()> {
        info!("[dry-run] stop {}", provider);
        self.transition(provider, ProviderState::Stopped);
        Ok(())
    }

    async fn state(&self, provider: &ProviderId) -> Result<ProviderState> {
        let Some(mut tracked) = self.providers.get_mut(provider) else {
            return Ok(ProviderState::Stopped);
        };
        if tracked.settle_in > 0 {
            tracked.settle_in -= 1;
            if tracked.settle_in == 0 {
                tracked.state = tracked.target;
            }
        }
        Ok(tracked.state)
    }

    async fn submit_command(&self, provider: &ProviderId, command: &str) -> Result<CommandId> {
        let id = CommandId(Uuid::new_v4().to_string());
        self.commands
            .insert(id.clone(), (provider.clone(), command.to_string()));
        Ok(id)
    }

    async fn command_status(&self, provider: &ProviderId, id: &CommandId) -> Result<CommandStatus> {
        let Some(entry) = self.commands.get(id) else {
            return Ok(CommandStatus::Failed(format!("unknown command {}", id)));
        };
        let (target, command) = entry.value();
        if target != provider {
            return Ok(CommandStatus::Failed(format!("command {} belongs to {}", id, target)));
        }
        let running = self
            .providers
            .get(provider)
            .map(|t| t.state == ProviderState::Running)
            .unwrap_or(false);
        Ok(if running {
            CommandStatus::Success(format!("[dry-run] {}", command))
        } else {
            CommandStatus::Failed(format!("{} is not running", provider))
        })
    }
}
