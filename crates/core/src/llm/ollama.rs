//! Ollama client for local inference, using the chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// Ollama API client.
///
/// Connects to a local Ollama server (default: http://localhost:11434).
/// No API key required.
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_base: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// "json" constrains the model to emit a single JSON value.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ChatMessage,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl ChatRequest {
    fn from_completion(model: &str, request: CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        Self {
            model: model.to_string(),
            messages,
            stream: false,
            format: request.json_mode.then_some("json"),
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest::from_completion(&self.model, request);

        let response = self
            .client
            .post(format!("{}/api/chat", self.api_base.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;

        Ok(CompletionResponse {
            text: chat.message.content,
            usage: LlmUsage {
                input_tokens: chat.prompt_eval_count,
                output_tokens: chat.eval_count,
            },
            model: chat.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(system: Option<&str>, json_mode: bool) -> CompletionRequest {
        CompletionRequest {
            prompt: "Ticket: my invoice is wrong".to_string(),
            system: system.map(String::from),
            max_tokens: 200,
            temperature: 0.0,
            json_mode,
        }
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("llama3").with_api_base("http://gpu-box:11434");
        assert_eq!(client.provider(), "ollama");
        assert_eq!(client.model(), "llama3");
        assert_eq!(client.api_base, "http://gpu-box:11434");
    }

    #[test]
    fn test_chat_request_puts_system_first() {
        let body = ChatRequest::from_completion(
            "llama3",
            completion(Some("Task: urgency_classification"), true),
        );
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 200);
    }

    #[test]
    fn test_chat_request_without_system_or_json() {
        let body = ChatRequest::from_completion("llama3", completion(None, false));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{
            "model": "llama3",
            "message": {"role": "assistant", "content": "{\"label\": \"high\"}"},
            "done": true,
            "eval_count": 12,
            "prompt_eval_count": 80
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, r#"{"label": "high"}"#);
        assert_eq!(parsed.eval_count, 12);
        assert_eq!(parsed.prompt_eval_count, 80);
    }
}
