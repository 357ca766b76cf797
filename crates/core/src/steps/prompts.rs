//! Prompts for the LLM-backed classification steps.
//!
//! Every system prompt starts with a `Task: <step name>` line so a single
//! client can serve all steps and responses can be traced back to the step
//! that asked.

use crate::classification::{Intent, ProductArea, Urgency};
use crate::executor::StepInput;
use crate::pipeline::StepName;

const PREAMBLE: &str =
    "You are an expert customer support ticket analyst for a B2B SaaS platform.";

const URGENCY_GUIDE: &str = r#"URGENCY LEVELS:
- critical: System down, production blocker, revenue-impacting, immediate response needed
- high: Major functionality affected, multiple users impacted, customer needs it fixed soon
- medium: Minor bug, single user affected, non-blocking
- low: General inquiry, documentation question, nice-to-have request"#;

const INTENT_GUIDE: &str = r#"INTENT TYPES:
- bug_report: Technical malfunction or error
- feature_request: Request for new functionality
- account_issue: Account access, permissions, settings
- billing_inquiry: Questions about payments, invoices, subscriptions
- billing_dispute: Customer contests a charge or invoice amount
- how_to: How to use existing features, documentation questions
- integration: Third-party integrations, API connectivity
- performance: Slow response times, timeouts, latency issues
- security: Security concerns, vulnerabilities, compliance"#;

const PRODUCT_AREA_GUIDE: &str = r#"PRODUCT AREAS:
- api: REST API, GraphQL, webhooks
- dashboard: Web interface, UI components
- mobile_app: iOS or Android applications
- integrations: Third-party integrations (Slack, Zapier, etc.)
- billing: Payment processing, invoices
- authentication: Login, SSO, OAuth
- analytics: Reports, data exports, metrics
- general: Multiple areas or unspecified"#;

/// System prompt for `step`.
pub(crate) fn system_prompt(step: StepName) -> String {
    let body = match step {
        StepName::SentimentAnalysis => r#"Judge the customer's sentiment in the ticket.

Respond with JSON only, no other text:
{
  "label": "positive|neutral|negative",
  "score": -0.7
}
The score runs from -1.0 (very negative) to 1.0 (very positive)."#
            .to_string(),
        StepName::Summarization => r#"Summarize the ticket in one or two sentences for a support agent. Keep product names and error messages.

Respond with JSON only, no other text:
{
  "summary": "..."
}"#
        .to_string(),
        StepName::UrgencyClassification => format!(
            "Classify the urgency of the ticket.\n\n{}\n\n{}",
            URGENCY_GUIDE,
            label_format(&Urgency::vocabulary())
        ),
        StepName::IntentClassification => format!(
            "Classify the intent of the ticket.\n\n{}\n\n{}",
            INTENT_GUIDE,
            label_format(&Intent::vocabulary())
        ),
        StepName::ProductAreaClassification => format!(
            "Classify which product area the ticket is about.\n\n{}\n\n{}",
            PRODUCT_AREA_GUIDE,
            label_format(&ProductArea::vocabulary())
        ),
        other => format!("Process the ticket for {}.", other),
    };

    format!("Task: {}\n{}\n\n{}", step, PREAMBLE, body)
}

fn label_format(vocabulary: &str) -> String {
    format!(
        r#"Respond with JSON only, no other text:
{{
  "label": "one of: {}",
  "confidence": 0.9,
  "reasoning": "Brief explanation (1-2 sentences)"
}}"#,
        vocabulary
    )
}

/// User prompt: the ticket plus whatever prerequisite context the step gets.
pub(crate) fn user_prompt(step: StepName, input: &StepInput) -> String {
    let ticket = &input.ticket;
    let mut prompt = String::from("TICKET:\n");
    if let Some(subject) = ticket.subject.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Subject: {}\n", subject));
    }
    prompt.push_str(&format!("Description: {}\n", ticket.text));

    if let Some(summary) = input.summary() {
        prompt.push_str(&format!("\nSummary: {}\n", summary));
    }
    if step == StepName::UrgencyClassification {
        if let Some((label, score)) = input.sentiment() {
            prompt.push_str(&format!("Customer sentiment: {} ({:.2})\n", label, score));
        }
    }

    prompt
}
