//! Language model clients used by the classification steps.

mod anthropic;
mod client;
mod config;
mod ollama;
mod openai;

pub use anthropic::AnthropicClient;
pub use client::{
    complete_json, extract_json, CompletionRequest, CompletionResponse, LlmClient, LlmError,
    LlmUsage,
};
pub use config::{build_llm_client, LlmConfig, LlmProvider};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
