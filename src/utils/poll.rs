//! Poll-with-timeout for remote operations that settle asynchronously
//! (instance state transitions, remote command completion).

use super::clock::Clock;
use crate::error::{ArbiterError, Result};
use log::debug;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
}

/// Calls `check` every `interval` until it yields `Some`, an error, or
/// `timeout` elapses on `clock`. `check` always runs at least once.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let timeout = chrono::Duration::from_std(timeout)
        .map_err(|e| ArbiterError::InvalidInput(format!("poll timeout out of range: {}", e)))?;
    let deadline = clock.now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check().await? {
            debug!("Poll settled after {} attempt(s)", attempts);
            return Ok(PollOutcome::Ready(value));
        }
        let now = clock.now();
        if now >= deadline {
            debug!("Poll timed out after {} attempt(s)", attempts);
            return Ok(PollOutcome::TimedOut);
        }
        let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        clock.sleep(interval.min(remaining)).await;
    }
}
