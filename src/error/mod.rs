// src/error/mod.rs
use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum ArbiterError {
    /// A requested content unit does not exist. Skipped, never retried.
    #[error("Data Not Found: {0}")]
    DataNotFound(String),

    /// Network, SSH or remote-exec endpoint unreachable
    #[error("Transient Connectivity Error: {0}")]
    TransientConnectivity(String),

    /// Checkpoint id already taken by another writer
    #[error("Conditional write conflict on checkpoint id {id}")]
    ConditionalWriteConflict { id: u64 },

    /// Required external parameter absent
    #[error("Configuration Missing: {0}")]
    ConfigurationMissing(String),

    /// Checkpoint store could not be reached or answered with an error
    #[error("Store Unavailable: {0}")]
    StoreUnavailable(String),

    /// Provider control plane rejected a request
    #[error("Provider Error: {0}")]
    Provider(String),

    /// A remote command finished in a failed state
    #[error("Command Failed: {0}")]
    CommandFailed(String),

    /// A polled operation did not reach a terminal state in time
    #[error("Timeout Error: {0}")]
    Timeout(String),

    /// Invalid input parameters
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// Parsing errors for price files, exports and stored records
    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("IO Error: {0}")]
    Io(String),

    /// Errors that should not be retried
    #[error("Non-Recoverable Error: {0}")]
    NonRecoverable(String),
}

impl From<serde_json::Error> for ArbiterError {
    fn from(err: serde_json::Error) -> Self {
        ArbiterError::Parse(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<csv::Error> for ArbiterError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            ArbiterError::Io(format!("CSV IO error: {}", err))
        } else {
            ArbiterError::Parse(format!("CSV error: {}", err))
        }
    }
}

impl From<std::io::Error> for ArbiterError {
    fn from(err: std::io::Error) -> Self {
        ArbiterError::Io(err.to_string())
    }
}

impl From<redis::RedisError> for ArbiterError {
    fn from(err: redis::RedisError) -> Self {
        ArbiterError::StoreUnavailable(format!("Redis error: {}", err))
    }
}

impl From<reqwest::Error> for ArbiterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ArbiterError::TransientConnectivity(format!("HTTP request failed: {}", err))
        } else if err.is_decode() {
            ArbiterError::Parse(format!("HTTP body decode error: {}", err))
        } else {
            ArbiterError::NonRecoverable(format!("HTTP error: {}", err))
        }
    }
}

impl ArbiterError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            ArbiterError::DataNotFound(_) => false, // skipped, not retried
            ArbiterError::TransientConnectivity(_) => true,
            ArbiterError::ConditionalWriteConflict { .. } => true, // re-derive the id
            ArbiterError::ConfigurationMissing(_) => false,
            ArbiterError::StoreUnavailable(_) => true,
            ArbiterError::Provider(_) => true,
            ArbiterError::CommandFailed(_) => true,
            ArbiterError::Timeout(_) => true,
            ArbiterError::InvalidInput(_) => false,
            ArbiterError::Parse(_) => false,
            ArbiterError::Io(_) => false,
            ArbiterError::NonRecoverable(_) => false,
        }
    }

    /// Determines if operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                ArbiterError::TransientConnectivity(_) => true,
                ArbiterError::StoreUnavailable(_) => true,
                ArbiterError::Timeout(_) => true,
                // Conflicts are resolved by the sequencer, which re-reads the counter.
                ArbiterError::ConditionalWriteConflict { .. } => false,
                ArbiterError::Provider(msg) => {
                    msg.contains("throttl") || msg.contains("rate") || msg.contains("temporar")
                }
                _ => false,
            }
    }

    /// Categorizes error for logging and the loop's termination decision
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            ArbiterError::DataNotFound(_) => ErrorCategory::Data,
            ArbiterError::TransientConnectivity(_) => ErrorCategory::Network,
            ArbiterError::ConditionalWriteConflict { .. } => ErrorCategory::Storage,
            ArbiterError::ConfigurationMissing(_) => ErrorCategory::Configuration,
            ArbiterError::StoreUnavailable(_) => ErrorCategory::Storage,
            ArbiterError::Provider(_) => ErrorCategory::Provider,
            ArbiterError::CommandFailed(_) => ErrorCategory::Provider,
            ArbiterError::Timeout(_) => ErrorCategory::Network,
            ArbiterError::InvalidInput(_) => ErrorCategory::Configuration,
            ArbiterError::Parse(_) => ErrorCategory::Data,
            ArbiterError::Io(_) => ErrorCategory::Data,
            ArbiterError::NonRecoverable(_) => ErrorCategory::Critical,
        }
    }

    /// Errors that end a simulation run early.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.categorize(),
            ErrorCategory::Configuration | ErrorCategory::Critical
        ) || matches!(self, ArbiterError::StoreUnavailable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Storage,
    Provider,
    Configuration,
    Critical,
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let factor = 2_u128.saturating_pow(attempt - 1);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }

    /// Execute operation with retry logic
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.should_retry() {
                        debug!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                        return Err(e);
                    }

                    warn!("Attempt {} failed: {} (retrying...)", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        error!("All {} retry attempts failed", self.max_attempts);
        Err(last_error
            .unwrap_or_else(|| ArbiterError::NonRecoverable("Max retries exceeded".to_string())))
    }
}

pub type Result<T> = std::result::Result<T, ArbiterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_taxonomy_classification() {
        assert!(!ArbiterError::DataNotFound("curid=7".into()).is_recoverable());
        assert!(ArbiterError::TransientConnectivity("reset".into()).should_retry());
        assert!(!ArbiterError::ConditionalWriteConflict { id: 5 }.should_retry());
        assert!(ArbiterError::ConditionalWriteConflict { id: 5 }.is_recoverable());
        assert!(ArbiterError::ConfigurationMissing("ARBITER_PROVIDERS".into()).is_fatal());
        assert!(ArbiterError::StoreUnavailable("down".into()).is_fatal());
        assert!(!ArbiterError::TransientConnectivity("x".into()).is_fatal());
        assert_eq!(
            ArbiterError::Timeout("poll".into()).categorize(),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_delay_for_attempt_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_execute_retries_only_retryable_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ArbiterError::StoreUnavailable("blip".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ArbiterError::Parse("bad row".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(ArbiterError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
