//! Error Types
//!
//! Raw operation failures, session failures, retry outcomes and the
//! caller-facing failure wrapper.

use serde::Serialize;
use std::io;
use thiserror::Error;

use crate::types::{FailureDescriptor, FailureReport};

/// Root error type for the execution layer.
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Operation failed: {0}")]
    Operation(#[from] OperationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Retry exhausted: {0}")]
    RetryExhausted(#[from] RetryExhaustedError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl ResilienceError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Operation(_) => "RESILIENCE_OPERATION",
            Self::Session(_) => "RESILIENCE_SESSION",
            Self::RetryExhausted(_) => "RESILIENCE_EXHAUSTED",
            Self::Configuration(_) => "RESILIENCE_CONFIG",
        }
    }

    /// The underlying operation failure, looking through retry exhaustion.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            Self::Operation(e) => Some(e),
            Self::RetryExhausted(e) => Some(&e.last_error),
            _ => None,
        }
    }
}

/// Transport-level failure signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportFailure {
    ConnectionRefused,
    ConnectionReset,
    Dns,
    Timeout,
}

/// Field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Raw failure returned by a wrapped operation.
///
/// The message is for logs only and never reaches the presentation layer.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    code: Option<String>,
    status: Option<u16>,
    transport: Option<TransportFailure>,
    field_errors: Vec<FieldError>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl OperationError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            transport: None,
            field_errors: Vec::new(),
            source: None,
        }
    }

    /// Create a transport failure.
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::new(message).with_transport(failure)
    }

    /// Create a validation failure for a single field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(message.clone()).with_field_error(field, message)
    }

    /// Attach a machine-readable error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach an HTTP-like status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a transport failure signal.
    pub fn with_transport(mut self, failure: TransportFailure) -> Self {
        self.transport = Some(failure);
        self
    }

    /// Attach a field validation failure.
    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    /// Attach the underlying error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn transport_failure(&self) -> Option<TransportFailure> {
        self.transport
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<io::Error> for OperationError {
    fn from(error: io::Error) -> Self {
        let transport = match error.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected => {
                Some(TransportFailure::ConnectionRefused)
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Some(TransportFailure::ConnectionReset),
            io::ErrorKind::TimedOut => Some(TransportFailure::Timeout),
            _ => None,
        };

        let mut converted = Self::new(error.to_string());
        converted.transport = transport;
        converted.with_source(error)
    }
}

impl From<SessionError> for OperationError {
    fn from(error: SessionError) -> Self {
        let code = match &error {
            SessionError::NoSession => "no_session",
            SessionError::InsufficientPrivilege => "permission_denied",
            SessionError::RefreshFailed { .. } => "refresh_failed",
            SessionError::PrivilegeCheckFailed { .. } => "privilege_check_failed",
        };
        Self::new(error.to_string())
            .with_code(code)
            .with_source(error)
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for OperationError {
    fn from(error: reqwest::Error) -> Self {
        let transport = if error.is_timeout() {
            Some(TransportFailure::Timeout)
        } else if error.is_connect() {
            Some(TransportFailure::ConnectionRefused)
        } else {
            None
        };
        let status = error.status().map(|s| s.as_u16());

        let mut converted = Self::new(error.to_string());
        converted.transport = transport;
        converted.status = status;
        converted.with_source(error)
    }
}

/// Session lifecycle error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session")]
    NoSession,

    #[error("insufficient privilege")]
    InsufficientPrivilege,

    #[error("session refresh failed: {message}")]
    RefreshFailed { message: String },

    #[error("privilege check failed: {message}")]
    PrivilegeCheckFailed { message: String },
}

/// Terminal retry failure; always wraps the last underlying error.
#[derive(Error, Debug)]
#[error("{} gave up after {attempts} retry attempts", .report.operation)]
pub struct RetryExhaustedError {
    pub report: FailureReport,
    pub attempts: u32,
    #[source]
    pub last_error: OperationError,
}

/// Outcome of a failed retry.
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("{} failure in {} is not recoverable", .report.kind, .report.operation)]
    NotRecoverable {
        report: FailureReport,
        #[source]
        error: OperationError,
    },

    #[error("retry attempt {attempt} of {} failed", .report.operation)]
    AttemptFailed {
        attempt: u32,
        report: FailureReport,
        #[source]
        error: OperationError,
    },

    #[error(transparent)]
    Exhausted(#[from] RetryExhaustedError),
}

impl RetryError {
    /// Report describing the failure that ended the retry.
    pub fn report(&self) -> &FailureReport {
        match self {
            Self::NotRecoverable { report, .. } | Self::AttemptFailed { report, .. } => report,
            Self::Exhausted(e) => &e.report,
        }
    }

    /// Split into the final report and the root error.
    pub fn into_parts(self) -> (FailureReport, ResilienceError) {
        match self {
            Self::NotRecoverable { report, error } | Self::AttemptFailed { report, error, .. } => {
                (report, ResilienceError::Operation(error))
            }
            Self::Exhausted(e) => (e.report.clone(), ResilienceError::RetryExhausted(e)),
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid message catalog: {message}")]
    InvalidCatalog { message: String },
}

/// Failure handed back to callers of the runner and the admin loop.
#[derive(Error, Debug)]
#[error("{}: {}", .descriptor.title, .descriptor.message)]
pub struct OperationFailure {
    /// What the presentation layer shows.
    pub descriptor: FailureDescriptor,
    /// Classified failure, for logs and bookkeeping.
    pub report: FailureReport,
    #[source]
    pub cause: ResilienceError,
}

/// Result type for execution-layer operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;
