use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Section-level checks live next to each section's type; this adds the
/// server and executor checks and wraps everything as a [`ConfigError`].
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.executor.step_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "executor.step_timeout_ms must be greater than 0".to_string(),
        ));
    }
    if config.executor.supported_languages.is_empty() {
        return Err(ConfigError::ValidationError(
            "executor.supported_languages must not be empty".to_string(),
        ));
    }
    if config.executor.max_keywords == 0 {
        return Err(ConfigError::ValidationError(
            "executor.max_keywords must be greater than 0".to_string(),
        ));
    }

    config
        .llm
        .validate()
        .and_then(|_| config.embedding.validate())
        .and_then(|_| config.vector_store.validate())
        .and_then(|_| config.dispatcher.validate())
        .and_then(|_| config.search.validate())
        .map_err(ConfigError::ValidationError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn config() -> Config {
        load_config_from_str(
            r#"
[llm]
provider = "ollama"
model = "llama3"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_section_errors_surface() {
        let mut config = config();
        config.llm.provider = crate::llm::LlmProvider::Anthropic;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("api_key"));

        let mut config = self::config();
        config.search.default_top_k = 500;
        assert!(validate_config(&config).is_err());

        let mut config = self::config();
        config.dispatcher.retry.max_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = self::config();
        config.executor.supported_languages.clear();
        assert!(validate_config(&config).is_err());
    }
}
