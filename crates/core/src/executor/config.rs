//! Step executor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the step executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-attempt timeout in milliseconds. A step that exceeds it fails
    /// with a retryable timeout.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_ms: u64,

    /// Primary language subtags the pipeline accepts (e.g. "en").
    /// Tickets in any other language fail terminally.
    #[serde(default = "default_languages")]
    pub supported_languages: Vec<String>,

    /// Maximum number of keywords kept by keyword extraction.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

fn default_step_timeout() -> u64 {
    30_000
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_max_keywords() -> usize {
    8
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout(),
            supported_languages: default_languages(),
            max_keywords: default_max_keywords(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.step_timeout_ms, 30_000);
        assert_eq!(config.supported_languages, vec!["en".to_string()]);
        assert_eq!(config.max_keywords, 8);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ExecutorConfig = toml::from_str(
            r#"
            supported_languages = ["en", "de"]
        "#,
        )
        .unwrap();
        assert_eq!(config.supported_languages.len(), 2);
        assert_eq!(config.step_timeout_ms, 30_000);
    }
}
