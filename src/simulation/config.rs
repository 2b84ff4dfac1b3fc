//! Typed settings for the simulation loop.

use crate::checkpoint::sequencer::DEFAULT_CONFLICT_ATTEMPTS;
use crate::config::Config;
use crate::error::RetryPolicy;
use crate::pricing::ProviderId;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub providers: Vec<ProviderId>,
    pub region: Option<String>,
    pub checkpoint_interval: Duration,
    pub price_refresh_interval: Duration,
    pub price_lookback: Duration,
    pub poll_interval: Duration,
    pub activation_timeout: Duration,
    pub command_timeout: Duration,
    pub connectivity_backoff: Duration,
    pub store_retry: RetryPolicy,
    pub conflict_max_attempts: u32,
    pub startup_command: Option<String>,
    pub start_unit_id: u64,
}

impl SimulationConfig {
    /// Defaults matching `Config::from_env` with nothing set.
    pub fn new(providers: Vec<ProviderId>) -> Self {
        Self {
            providers,
            region: None,
            checkpoint_interval: Duration::from_secs(300),
            price_refresh_interval: Duration::from_secs(60),
            price_lookback: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(5000),
            activation_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(120),
            connectivity_backoff: Duration::from_millis(2000),
            store_retry: RetryPolicy::default(),
            conflict_max_attempts: DEFAULT_CONFLICT_ATTEMPTS,
            startup_command: None,
            start_unit_id: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let store_delay = Duration::from_millis(config.store_retry_delay_ms);
        Self {
            providers: config.providers.clone(),
            region: config.region.clone(),
            checkpoint_interval: Duration::from_secs(config.checkpoint_interval_secs),
            price_refresh_interval: Duration::from_secs(config.price_refresh_interval_secs),
            price_lookback: Duration::from_secs(config.price_lookback_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            activation_timeout: Duration::from_secs(config.activation_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            connectivity_backoff: Duration::from_millis(config.connectivity_backoff_ms),
            store_retry: RetryPolicy::new(config.store_max_retries, store_delay, store_delay * 16),
            conflict_max_attempts: config.conflict_max_attempts,
            startup_command: config.startup_command.clone(),
            start_unit_id: config.start_unit_id,
        }
    }
}
