//! LLM client abstraction.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::executor::{StepError, TerminalStepError, TransientStepError};

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

/// Provider failures mapped onto step failures.
///
/// Rate limits, timeouts, transport faults, 5xx and unusable model output
/// are transient. Other 4xx responses and missing configuration will fail
/// the same way every time.
impl From<LlmError> for StepError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Http(msg) => TransientStepError::Network(msg).into(),
            LlmError::Timeout(d) => TransientStepError::Timeout(d.as_millis() as u64).into(),
            LlmError::Api { status: 429, message } => {
                TransientStepError::RateLimited(message).into()
            }
            LlmError::Api { status: 408, .. } => {
                TransientStepError::Timeout(0).into()
            }
            LlmError::Api { status, message } if status >= 500 => {
                TransientStepError::Unavailable(format!("{}: {}", status, message)).into()
            }
            LlmError::Api { status, message } => {
                TerminalStepError::Rejected(format!("{}: {}", status, message)).into()
            }
            LlmError::Json(msg) => {
                TransientStepError::Unavailable(format!("unusable model response: {}", msg)).into()
            }
            LlmError::NotConfigured(msg) => TerminalStepError::Rejected(msg).into(),
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (instructions for the model)
    pub system: Option<String>,
    /// User message
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
    /// Ask the provider for a JSON object, where supported.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 300,
            temperature: 0.3,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Token usage
    pub usage: LlmUsage,
    /// Model used
    pub model: String,
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "anthropic", "openai", "ollama")
    fn provider(&self) -> &str;

    /// Model name (e.g., "gpt-4o-mini")
    fn model(&self) -> &str;

    /// Send a completion request and get a text response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Send a completion request and parse the response as JSON.
///
/// Models sometimes wrap JSON in a code fence or a sentence; the first
/// object in the text is used.
pub async fn complete_json<T: DeserializeOwned>(
    client: &dyn LlmClient,
    request: CompletionRequest,
) -> Result<(T, LlmUsage), LlmError> {
    let response = client.complete(request.with_json_mode()).await?;
    let json = extract_json(&response.text)
        .ok_or_else(|| LlmError::Json(format!("no JSON object in response: {}", response.text)))?;
    let parsed: T = serde_json::from_str(json)
        .map_err(|e| LlmError::Json(format!("{}: {}", e, response.text)))?;
    Ok((parsed, response.usage))
}

/// The outermost `{...}` span of `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
