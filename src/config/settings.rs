use crate::error::{ArbiterError, Result};
use crate::pricing::ProviderId;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Priority order: earlier providers win price ties.
    pub providers: Vec<ProviderId>,
    pub region: Option<String>,
    pub redis_url: String,
    pub checkpoint_namespace: String,
    pub checkpoint_interval_secs: u64,
    pub price_refresh_interval_secs: u64,
    pub price_lookback_secs: u64,
    pub poll_interval_ms: u64,
    pub activation_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub connectivity_backoff_ms: u64,
    pub store_max_retries: u32,
    pub store_retry_delay_ms: u64,
    pub conflict_max_attempts: u32,
    pub task_url_template: Option<String>,
    pub task_timeout_secs: u64,
    pub startup_command: Option<String>,
    pub start_unit_id: u64,
    pub price_history_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

fn parsed_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; missing or unparsable values
    /// fall back to defaults. Required values are checked by `validate`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Config {
            providers: lookup("ARBITER_PROVIDERS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(ProviderId::new)
                        .collect()
                })
                .unwrap_or_default(),
            region: non_empty(&lookup, "ARBITER_REGION"),
            redis_url: non_empty(&lookup, "REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1/".to_string()),
            checkpoint_namespace: non_empty(&lookup, "CHECKPOINT_NAMESPACE")
                .unwrap_or_else(|| "spot_arbiter".to_string()),
            checkpoint_interval_secs: parsed_or(&lookup, "CHECKPOINT_INTERVAL_SECS", 300),
            price_refresh_interval_secs: parsed_or(&lookup, "PRICE_REFRESH_INTERVAL_SECS", 60),
            price_lookback_secs: parsed_or(&lookup, "PRICE_LOOKBACK_SECS", 3600),
            poll_interval_ms: parsed_or(&lookup, "POLL_INTERVAL_MS", 5000),
            activation_timeout_secs: parsed_or(&lookup, "ACTIVATION_TIMEOUT_SECS", 30),
            command_timeout_secs: parsed_or(&lookup, "COMMAND_TIMEOUT_SECS", 120),
            connectivity_backoff_ms: parsed_or(&lookup, "CONNECTIVITY_BACKOFF_MS", 2000),
            store_max_retries: parsed_or(&lookup, "STORE_MAX_RETRIES", 3),
            store_retry_delay_ms: parsed_or(&lookup, "STORE_RETRY_DELAY_MS", 250),
            conflict_max_attempts: parsed_or(&lookup, "CONFLICT_MAX_ATTEMPTS", 16),
            task_url_template: non_empty(&lookup, "TASK_URL_TEMPLATE"),
            task_timeout_secs: parsed_or(&lookup, "TASK_TIMEOUT_SECS", 10),
            startup_command: non_empty(&lookup, "STARTUP_COMMAND"),
            start_unit_id: parsed_or(&lookup, "START_UNIT_ID", 0),
            price_history_dir: non_empty(&lookup, "PRICE_HISTORY_DIR").map(PathBuf::from),
            log_level: non_empty(&lookup, "LOG_LEVEL").or_else(|| non_empty(&lookup, "RUST_LOG")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(ArbiterError::ConfigurationMissing(
                "ARBITER_PROVIDERS must list at least one provider".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.providers.iter().find(|p| !seen.insert(*p)) {
            return Err(ArbiterError::InvalidInput(format!(
                "ARBITER_PROVIDERS lists {} twice",
                dup
            )));
        }
        if self.checkpoint_interval_secs == 0 {
            return Err(ArbiterError::InvalidInput(
                "CHECKPOINT_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ArbiterError::InvalidInput(
                "POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }
        if let Some(template) = &self.task_url_template {
            if !template.contains("{id}") {
                return Err(ArbiterError::InvalidInput(format!(
                    "TASK_URL_TEMPLATE '{}' has no {{id}} placeholder",
                    template
                )));
            }
        }
        Ok(())
    }

    /// Fails with `ConfigurationMissing` when `value` is absent.
    pub fn require<'a, T>(value: &'a Option<T>, key: &str) -> Result<&'a T> {
        value
            .as_ref()
            .ok_or_else(|| ArbiterError::ConfigurationMissing(format!("{} is not set", key)))
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
    }
}
