//! Ticket types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::TicketText;

fn default_language() -> String {
    "en".to_string()
}

/// A stored support ticket. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id assigned by the ingestion boundary.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Raw ticket body.
    pub text: String,
    /// BCP 47 language tag, e.g. `en` or `en-US`.
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// When the customer submitted the ticket.
    pub submitted_at: DateTime<Utc>,
    /// When the ticket was persisted.
    pub received_at: DateTime<Utc>,
}

impl Ticket {
    /// The part of the ticket step handlers get to see.
    pub fn to_text(&self) -> TicketText {
        TicketText {
            ticket_id: self.id.clone(),
            subject: self.subject.clone(),
            text: self.text.clone(),
            language: self.language.clone(),
        }
    }
}

/// A "ticket submitted" ingress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSubmission {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Defaults to the time the submission is received.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl TicketSubmission {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: None,
            text: text.into(),
            language: default_language(),
            customer_email: None,
            submitted_at: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_submitted_at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(submitted_at);
        self
    }

    /// Shape checks done at the ingestion boundary.
    ///
    /// Blank text passes; the executor fails it as malformed input and the
    /// failure lands in job history.
    pub fn validate(&self) -> Result<(), String> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err("ticket id must not be empty".to_string());
        }
        if id.len() > 256 {
            return Err("ticket id must be at most 256 characters".to_string());
        }
        if self.language.trim().is_empty() {
            return Err("language must not be empty".to_string());
        }
        if let Some(ref email) = self.customer_email {
            if !email.contains('@') {
                return Err(format!("invalid customer email: {}", email));
            }
        }
        Ok(())
    }

    pub fn into_ticket(self, received_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id: self.id.trim().to_string(),
            subject: self.subject.filter(|s| !s.trim().is_empty()),
            text: self.text,
            language: self.language.trim().to_string(),
            customer_email: self.customer_email,
            submitted_at: self.submitted_at.unwrap_or(received_at),
            received_at,
        }
    }
}
