//! Failure Classifier
//!
//! Maps raw operation failures onto the failure taxonomy.
//!
//! Rules are evaluated in priority order; the first match wins:
//!
//! 1. session signal (token/expiry keywords, status 401)
//! 2. transport signal (connection refused, DNS, timeout, status 408)
//! 3. permission signal (status 403, "forbidden", "permission denied")
//! 4. credential rejection ("invalid credentials", "wrong password")
//! 5. validation signal (field errors, status 400/422)
//! 6. upstream signal (status 5xx, "service unavailable")
//! 7. otherwise unknown

use std::sync::Arc;

use crate::core::{Clock, SystemClock};
use crate::error::OperationError;
use crate::types::{FailureKind, FailureReport};

const SESSION_KEYWORDS: &[&str] = &[
    "jwt",
    "token",
    "expired",
    "unauthorized",
    "authentication",
    "session",
    "invalid_grant",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "connection refused",
    "econnrefused",
    "connection reset",
    "econnreset",
    "dns",
    "enotfound",
    "getaddrinfo",
    "timed out",
    "timeout",
    "etimedout",
    "network",
    "failed to fetch",
    "fetch failed",
];

const PERMISSION_KEYWORDS: &[&str] = &[
    "permission denied",
    "permission_denied",
    "forbidden",
    "insufficient privilege",
    "access denied",
    "not authorized",
    "not allowed",
];

const AUTH_KEYWORDS: &[&str] = &[
    "invalid credentials",
    "invalid_credentials",
    "invalid login",
    "bad credentials",
    "wrong password",
];

const VALIDATION_KEYWORDS: &[&str] = &[
    "validation",
    "invalid input",
    "invalid_input",
    "is required",
    "malformed",
    "violates",
];

const UPSTREAM_KEYWORDS: &[&str] = &[
    "internal server error",
    "bad gateway",
    "service unavailable",
    "upstream",
];

/// Per-call classification context.
#[derive(Debug, Clone)]
pub struct ClassificationContext {
    /// Name of the operation that failed.
    pub operation_name: String,
    /// Kind to use when no rule matches.
    pub kind_hint: Option<FailureKind>,
}

impl ClassificationContext {
    /// Create context for an operation.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            kind_hint: None,
        }
    }

    /// Set the fallback kind.
    pub fn kind_hint(mut self, kind: FailureKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }
}

/// Failure classifier.
#[derive(Clone)]
pub struct FailureClassifier {
    clock: Arc<dyn Clock>,
}

impl FailureClassifier {
    /// Create classifier stamping reports with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Classify a failure into a report.
    pub fn classify(&self, error: &OperationError, context: &ClassificationContext) -> FailureReport {
        let kind = match classify_kind(error) {
            FailureKind::Unknown => context.kind_hint.unwrap_or(FailureKind::Unknown),
            kind => kind,
        };

        FailureReport::new(
            context.operation_name.clone(),
            kind,
            error.to_string(),
            self.clock.now(),
        )
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Determine the failure kind of a raw error.
pub fn classify_kind(error: &OperationError) -> FailureKind {
    let haystack = signal_text(error);
    let status = error.status();

    if status == Some(401) || contains_any(&haystack, SESSION_KEYWORDS) {
        FailureKind::Session
    } else if error.transport_failure().is_some()
        || status == Some(408)
        || contains_any(&haystack, NETWORK_KEYWORDS)
    {
        FailureKind::Network
    } else if status == Some(403) || contains_any(&haystack, PERMISSION_KEYWORDS) {
        FailureKind::Permission
    } else if contains_any(&haystack, AUTH_KEYWORDS) {
        FailureKind::Auth
    } else if !error.field_errors().is_empty()
        || matches!(status, Some(400) | Some(422))
        || contains_any(&haystack, VALIDATION_KEYWORDS)
    {
        FailureKind::Validation
    } else if matches!(status, Some(500..=599)) || contains_any(&haystack, UPSTREAM_KEYWORDS) {
        FailureKind::Upstream
    } else {
        FailureKind::Unknown
    }
}

fn signal_text(error: &OperationError) -> String {
    let mut text = error.message().to_lowercase();
    if let Some(code) = error.code() {
        text.push(' ');
        text.push_str(&code.to_lowercase());
    }
    text
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
