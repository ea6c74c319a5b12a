//! Message Catalog
//!
//! User-facing `{title, message}` pairs keyed by failure message key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::types::{FailureDescriptor, FailureKind, FailureReport};

/// Localizable message pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub title: String,
    pub message: String,
}

impl MessageTemplate {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Message table resolving message keys to user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageCatalog {
    entries: HashMap<String, MessageTemplate>,
}

impl MessageCatalog {
    /// Catalog holding only the built-in English messages.
    pub fn english() -> Self {
        let entries = FailureKind::ALL
            .iter()
            .map(|kind| (kind.message_key().to_string(), default_template(*kind)))
            .collect();
        Self { entries }
    }

    /// Parse a catalog from JSON (`{"error.network": {"title": .., "message": ..}}`).
    ///
    /// Keys missing from the JSON keep their English defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let overrides: HashMap<String, MessageTemplate> =
            serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidCatalog {
                message: e.to_string(),
            })?;

        let mut catalog = Self::english();
        catalog.entries.extend(overrides);
        Ok(catalog)
    }

    /// Override the message for a key.
    pub fn with_message(mut self, key: impl Into<String>, template: MessageTemplate) -> Self {
        self.entries.insert(key.into(), template);
        self
    }

    /// Look up a message key.
    pub fn get(&self, key: &str) -> Option<&MessageTemplate> {
        self.entries.get(key)
    }

    /// Resolve the user-facing descriptor for a report.
    pub fn describe(&self, report: &FailureReport) -> FailureDescriptor {
        let template = self
            .get(report.message_key)
            .cloned()
            .unwrap_or_else(|| default_template(report.kind));

        FailureDescriptor {
            title: template.title,
            message: template.message,
            can_retry_manually: report.is_recoverable || report.kind == FailureKind::Unknown,
        }
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::english()
    }
}

fn default_template(kind: FailureKind) -> MessageTemplate {
    match kind {
        FailureKind::Network => MessageTemplate::new(
            "Connection problem",
            "We couldn't reach the server. Please check your connection and try again.",
        ),
        FailureKind::Auth => MessageTemplate::new(
            "Sign-in failed",
            "Your credentials were not accepted. Please sign in again.",
        ),
        FailureKind::Session => MessageTemplate::new(
            "Session expired",
            "Your session has expired. Please sign in again.",
        ),
        FailureKind::Validation => MessageTemplate::new(
            "Invalid input",
            "Some of the information provided is invalid. Please review it and try again.",
        ),
        FailureKind::Permission => MessageTemplate::new(
            "Access denied",
            "You don't have permission to perform this action.",
        ),
        FailureKind::Upstream => MessageTemplate::new(
            "Service unavailable",
            "The service is temporarily unavailable. Please try again later.",
        ),
        FailureKind::Unknown => MessageTemplate::new(
            "Something went wrong",
            "An unexpected error occurred. Please try again.",
        ),
    }
}
