//! Retry budget and backoff schedule.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff delays must be finite and non-negative, got {0}")]
    InvalidDelay(String),
}

/// How many times to try each source and how long to wait in between.
///
/// After failed attempt `i` (0-indexed) the strategy waits
/// `backoff_schedule[min(i, len - 1)]` before trying the same source again.
/// No wait follows the last attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_schedule: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_schedule: Vec<Duration>) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            backoff_schedule,
        })
    }

    /// Convenience constructor from whole seconds.
    pub fn from_secs(max_attempts: u32, backoff_secs: &[u64]) -> Result<Self, RetryPolicyError> {
        Self::new(
            max_attempts,
            backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        )
    }

    /// A single attempt per source, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_schedule: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_schedule(&self) -> &[Duration] {
        &self.backoff_schedule
    }

    /// Wait after failed attempt `attempt`, clamped to the schedule's last
    /// element. Zero when the schedule is empty.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let Some(last) = self.backoff_schedule.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let idx = (attempt as usize).min(last);
        self.backoff_schedule[idx]
    }

    /// Whether `attempt` is the final one for a source.
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }

    /// Total time slept against one source that fails every attempt.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, waiting 1s then 2s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

/// Serialized form used in catalog files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRetryPolicy {
    max_attempts: u32,
    #[serde(default)]
    backoff_secs: Vec<f64>,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = RetryPolicyError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let schedule = raw
            .backoff_secs
            .into_iter()
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .map_err(|_| RetryPolicyError::InvalidDelay(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        RetryPolicy::new(raw.max_attempts, schedule)
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            backoff_secs: policy
                .backoff_schedule
                .iter()
                .map(Duration::as_secs_f64)
                .collect(),
        }
    }
}

/// Blocking wait between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
