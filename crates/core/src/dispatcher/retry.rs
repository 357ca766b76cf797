//! Per-step retry policies.

use std::collections::HashMap;
use std::time::Duration;

use crate::executor::StepError;
use crate::pipeline::StepName;

use super::{DispatcherConfig, RetryConfig};

/// Decides whether a failed attempt is retried and how long to wait first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    retryable: fn(&StepError) -> bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            retryable: StepError::is_retryable,
        }
    }

    /// Replace the predicate that decides which errors are worth retrying.
    pub fn with_retryable(mut self, retryable: fn(&StepError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, error: &StepError) -> bool {
        (self.retryable)(error)
    }

    /// True if attempt number `attempt` failed with `error` and another
    /// attempt is still within budget.
    pub fn should_retry(&self, error: &StepError, attempt: u32) -> bool {
        self.is_retryable(error) && attempt < self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// The default policy plus per-step overrides.
#[derive(Debug, Clone)]
pub struct RetryPolicies {
    default: RetryPolicy,
    overrides: HashMap<StepName, RetryPolicy>,
}

impl RetryPolicies {
    /// Unknown step names in `step_retry` are ignored here; config validation
    /// reports them.
    pub fn from_config(config: &DispatcherConfig) -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(
            StepName::Indexing,
            RetryPolicy::from_config(&config.indexing_retry),
        );
        for (name, retry) in &config.step_retry {
            if let Ok(step) = name.parse::<StepName>() {
                overrides.insert(step, RetryPolicy::from_config(retry));
            }
        }

        Self {
            default: RetryPolicy::from_config(&config.retry),
            overrides,
        }
    }

    pub fn for_step(&self, step: StepName) -> &RetryPolicy {
        self.overrides.get(&step).unwrap_or(&self.default)
    }
}
