//! Dispatcher configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::StepName;

/// Exponential backoff settings for one step (or the default for all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds).
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Default policy for the trailing indexing step: the vector store gets
    /// more patience than the LLM.
    pub fn indexing() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }

    pub fn validate(&self, section: &str) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err(format!("{}.max_attempts must be at least 1", section));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!("{}.backoff_multiplier must be >= 1.0", section));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "{}.initial_delay_ms must not exceed max_delay_ms",
                section
            ));
        }
        Ok(())
    }
}

/// Configuration for the job dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Jobs allowed in `running` at once. Others wait in `pending`.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Capacity of the ingress command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Retry policy for every step without an override.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "RetryConfig::indexing")]
    pub indexing_retry: RetryConfig,

    /// Per-step overrides keyed by step name, e.g. `[dispatcher.step_retry.summarization]`.
    #[serde(default)]
    pub step_retry: HashMap<String, RetryConfig>,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_command_buffer() -> usize {
    256
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            command_buffer: default_command_buffer(),
            retry: RetryConfig::default(),
            indexing_retry: RetryConfig::indexing(),
            step_retry: HashMap::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_jobs == 0 {
            return Err("dispatcher.max_concurrent_jobs must be at least 1".to_string());
        }
        if self.command_buffer == 0 {
            return Err("dispatcher.command_buffer must be at least 1".to_string());
        }
        self.retry.validate("dispatcher.retry")?;
        self.indexing_retry.validate("dispatcher.indexing_retry")?;
        for (step, retry) in &self.step_retry {
            step.parse::<StepName>()
                .map_err(|e| format!("dispatcher.step_retry: {}", e))?;
            retry.validate(&format!("dispatcher.step_retry.{}", step))?;
        }
        Ok(())
    }
}
