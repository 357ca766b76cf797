//! Mock LLM client for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};
use crate::pipeline::StepName;

/// Mock implementation of the LlmClient trait.
///
/// Requests are routed by the `Task: <step>` line that opens every step's
/// system prompt. Each step answers with a canned JSON response describing
/// the invoice ticket unless the test overrides it.
///
/// # Example
///
/// ```rust,ignore
/// use triage_core::testing::MockLlmClient;
///
/// let client = MockLlmClient::new();
/// client.respond(StepName::UrgencyClassification, r#"{"label": "low", "confidence": 0.6}"#);
/// client.push_error(StepName::Summarization, LlmError::Timeout(Duration::from_secs(1)));
///
/// assert_eq!(client.calls(StepName::Summarization), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<HashMap<StepName, String>>,
    errors: Mutex<HashMap<StepName, VecDeque<LlmError>>>,
    calls: Mutex<HashMap<StepName, usize>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every later request for `step` with `text`.
    pub fn respond(&self, step: StepName, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(step, text.to_string());
    }

    /// Fail the next request for `step` with `error`. Queued errors are
    /// returned before any response.
    pub fn push_error(&self, step: StepName, error: LlmError) {
        self.errors
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(error);
    }

    /// Requests received for `step`.
    pub fn calls(&self, step: StepName) -> usize {
        self.calls.lock().unwrap().get(&step).copied().unwrap_or(0)
    }

    fn default_response(step: StepName) -> &'static str {
        match step {
            StepName::SentimentAnalysis => r#"{"label": "negative", "score": -0.7}"#,
            StepName::UrgencyClassification => {
                r#"{"label": "high", "confidence": 0.9, "reasoning": "customer needs a fix today"}"#
            }
            StepName::IntentClassification => {
                r#"{"label": "billing_dispute", "confidence": 0.88, "reasoning": "disputes an invoice charge"}"#
            }
            StepName::ProductAreaClassification => {
                r#"{"label": "billing", "confidence": 0.92, "reasoning": "invoice and charges"}"#
            }
            StepName::Summarization => {
                r#"{"summary": "Customer reports a wrong invoice charge and needs it fixed today."}"#
            }
            _ => "{}",
        }
    }
}

fn step_of(request: &CompletionRequest) -> Option<StepName> {
    request
        .system
        .as_deref()?
        .lines()
        .next()?
        .strip_prefix("Task: ")?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let step = step_of(&request)
            .ok_or_else(|| LlmError::Api {
                status: 400,
                message: "request names no task".to_string(),
            })?;

        *self.calls.lock().unwrap().entry(step).or_insert(0) += 1;

        if let Some(error) = self
            .errors
            .lock()
            .unwrap()
            .get_mut(&step)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        let text = self
            .responses
            .lock()
            .unwrap()
            .get(&step)
            .cloned()
            .unwrap_or_else(|| Self::default_response(step).to_string());

        Ok(CompletionResponse {
            usage: LlmUsage {
                input_tokens: (request.prompt.len() / 4) as u32,
                output_tokens: (text.len() / 4) as u32,
            },
            text,
            model: self.model().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(step: StepName) -> CompletionRequest {
        CompletionRequest::new("TICKET:\nDescription: hello")
            .with_system(format!("Task: {}\nYou are an analyst.", step))
    }

    #[tokio::test]
    async fn test_routes_by_task_line() {
        let client = MockLlmClient::new();
        client.respond(StepName::UrgencyClassification, r#"{"label": "low"}"#);

        let urgency = client
            .complete(request(StepName::UrgencyClassification))
            .await
            .unwrap();
        assert_eq!(urgency.text, r#"{"label": "low"}"#);

        let intent = client
            .complete(request(StepName::IntentClassification))
            .await
            .unwrap();
        assert!(intent.text.contains("billing_dispute"));

        assert_eq!(client.calls(StepName::UrgencyClassification), 1);
        assert_eq!(client.calls(StepName::Summarization), 0);
    }

    #[tokio::test]
    async fn test_queued_errors_come_first() {
        let client = MockLlmClient::new();
        client.push_error(
            StepName::Summarization,
            LlmError::Timeout(Duration::from_secs(1)),
        );

        assert!(client.complete(request(StepName::Summarization)).await.is_err());
        assert!(client.complete(request(StepName::Summarization)).await.is_ok());
        assert_eq!(client.calls(StepName::Summarization), 2);
    }

    #[tokio::test]
    async fn test_untagged_request_rejected() {
        let client = MockLlmClient::new();
        let err = client
            .complete(CompletionRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 400, .. }));
    }
}
