//! Bounded retry with exponential backoff and jitter.
//!
//! Wraps the dialogue and speech calls, which fail transiently far more often
//! than anything else in a run. Non-retryable errors return immediately, and
//! a cancelled run never starts another attempt.

use std::cell::Cell;
use std::future::Future;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BackendError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomizes each delay by up to ±(factor * delay).
    pub jitter_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before `attempt` (0-indexed). The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self
            .initial_delay_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        let capped = base.min(self.max_delay_ms);

        let delay = if self.jitter_factor > 0.0 && capped > 0 {
            let range = (capped as f64 * self.jitter_factor as f64) as u64;
            let jitter = random_u64() % (range * 2 + 1);
            capped.saturating_sub(range).saturating_add(jitter)
        } else {
            capped
        };

        Duration::from_millis(delay)
    }
}

/// Why `with_retry` gave up.
#[derive(Debug)]
pub enum RetryError {
    /// Last error seen, either fatal or after the final attempt.
    Failed { error: BackendError, attempts: u32 },
    Cancelled,
}

/// Run `operation` until it succeeds, fails fatally, runs out of attempts, or
/// `cancel` fires. `label` only feeds the log lines.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error: Option<BackendError> = None;

    for attempt in 0..max_attempts {
        let delay = last_error
            .as_ref()
            .and_then(BackendError::retry_after)
            .map(|d| d.min(Duration::from_millis(policy.max_delay_ms.max(1))))
            .unwrap_or_else(|| policy.delay_for_attempt(attempt));

        if !delay.is_zero() {
            debug!("{label}: retrying in {}ms (attempt {})", delay.as_millis(), attempt + 1);
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => {
                return Err(RetryError::Failed {
                    error,
                    attempts: attempt + 1,
                });
            }
            Err(error) => {
                warn!("{label}: attempt {}/{max_attempts} failed: {error}", attempt + 1);
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Err(RetryError::Failed {
            error,
            attempts: max_attempts,
        }),
        None => Err(RetryError::Cancelled),
    }
}

/// xorshift seeded from the clock; only used to spread retries apart.
fn random_u64() -> u64 {
    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x2545_f491)
                | 1
        );
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}
