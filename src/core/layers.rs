//! Wrappers that add a deadline or retries around a step.
//!
//! Both are steps themselves, so the orchestrator never sees the difference.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{BriefView, FailureKind, StepFailure};

use super::step::{Step, StepResult};

/// Fails the inner step if it does not finish within `limit`
pub struct Timeout {
    inner: Arc<dyn Step>,
    limit: Duration,
}

impl Timeout {
    pub fn new(inner: Arc<dyn Step>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Step for Timeout {
    async fn run(&self, brief: &BriefView) -> StepResult {
        match tokio::time::timeout(self.limit, self.inner.run(brief)).await {
            Ok(result) => result,
            Err(_) => Err(StepFailure::timed_out(format!(
                "Step did not finish within {:?}",
                self.limit
            ))),
        }
    }
}

/// Retry policy for failed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Re-runs the inner step on failure, with exponential backoff
pub struct Retry {
    inner: Arc<dyn Step>,
    policy: RetryPolicy,
    label: String,
}

impl Retry {
    pub fn new(inner: Arc<dyn Step>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            label: String::new(),
        }
    }

    /// Name used in retry log lines
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl Step for Retry {
    async fn run(&self, brief: &BriefView) -> StepResult {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.inner.run(brief).await {
                Ok(output) => return Ok(output),
                Err(failure) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        step = %self.label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    if attempt <= 1 {
                        return Err(failure);
                    }
                    return Err(StepFailure::with_kind(
                        failure.kind,
                        format!("{} (after {} attempts)", failure.message, attempt),
                    ));
                }
            }
        }
    }
}

/// True when a failure came from a wrapper deadline
pub fn is_timeout(failure: &StepFailure) -> bool {
    failure.kind == FailureKind::TimedOut
}
