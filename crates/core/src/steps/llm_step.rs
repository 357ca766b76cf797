//! Classification steps answered by a language model.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::classification::{Intent, Labeled, ProductArea, Sentiment};
use crate::executor::{StepError, StepHandler, StepInput, StepOutput};
use crate::llm::{complete_json, CompletionRequest, LlmClient, LlmConfig, LlmUsage};
use crate::metrics;
use crate::pipeline::StepName;

use super::prompts;

const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    label: String,
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// One LLM prompt per step: sentiment, summarization and the three
/// classifiers.
pub struct LlmStep {
    step: StepName,
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmStep {
    pub fn new(step: StepName, client: Arc<dyn LlmClient>) -> Self {
        Self {
            step,
            client,
            max_tokens: 300,
            temperature: 0.3,
        }
    }

    pub fn with_settings(mut self, config: &LlmConfig) -> Self {
        self.max_tokens = config.max_tokens;
        self.temperature = config.temperature;
        self
    }

    /// One handler per LLM step, sharing `client`.
    pub fn all(client: Arc<dyn LlmClient>, config: &LlmConfig) -> Vec<LlmStep> {
        StepName::ALL
            .iter()
            .filter(|s| s.uses_llm())
            .map(|s| LlmStep::new(*s, Arc::clone(&client)).with_settings(config))
            .collect()
    }

    async fn ask<T: serde::de::DeserializeOwned>(&self, input: &StepInput) -> Result<T, StepError> {
        let request = CompletionRequest::new(prompts::user_prompt(self.step, input))
            .with_system(prompts::system_prompt(self.step))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let start = Instant::now();
        let result = complete_json::<T>(self.client.as_ref(), request).await;
        metrics::observe_external_call(
            "llm",
            self.step.as_str(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        let (parsed, usage) = result?;
        self.record_usage(&usage);
        Ok(parsed)
    }

    fn record_usage(&self, usage: &LlmUsage) {
        let provider = self.client.provider();
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "input"])
            .inc_by(u64::from(usage.input_tokens));
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "output"])
            .inc_by(u64::from(usage.output_tokens));
        debug!(
            step = %self.step,
            provider,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "LLM usage"
        );
    }
}

/// A label outside the vocabulary is an unusable response, which another
/// attempt may fix.
fn parse_label<T>(raw: &str) -> Result<T, StepError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StepError::unavailable(format!("unusable model response: {}", e)))
}

fn labeled<T>(response: LabelResponse) -> Result<Labeled<T>, StepError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let label = parse_label::<T>(&response.label)?;
    Ok(Labeled::new(
        label,
        response.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        response.reasoning,
    ))
}

#[async_trait]
impl StepHandler for LlmStep {
    fn step(&self) -> StepName {
        self.step
    }

    async fn run(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        match self.step {
            StepName::SentimentAnalysis => {
                let response: SentimentResponse = self.ask(input).await?;
                let label = parse_label::<Sentiment>(&response.label)?;
                let score = if response.score.is_finite() {
                    response.score.clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                Ok(StepOutput::SentimentAnalysis { label, score })
            }
            StepName::Summarization => {
                let response: SummaryResponse = self.ask(input).await?;
                let text = response.summary.trim().to_string();
                if text.is_empty() {
                    return Err(StepError::unavailable("unusable model response: empty summary"));
                }
                Ok(StepOutput::Summarization { text })
            }
            StepName::UrgencyClassification => {
                let response: LabelResponse = self.ask(input).await?;
                Ok(StepOutput::UrgencyClassification(labeled(response)?))
            }
            StepName::IntentClassification => {
                let response: LabelResponse = self.ask(input).await?;
                Ok(StepOutput::IntentClassification(labeled::<Intent>(response)?))
            }
            StepName::ProductAreaClassification => {
                let response: LabelResponse = self.ask(input).await?;
                Ok(StepOutput::ProductAreaClassification(labeled::<ProductArea>(
                    response,
                )?))
            }
            other => Err(StepError::rejected(format!("{} is not an LLM step", other))),
        }
    }
}
