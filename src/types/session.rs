//! Session Types
//!
//! Credential material and session outcomes.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::FailureDescriptor;

/// Opaque credential with an absolute expiry.
#[derive(Clone)]
pub struct Credential {
    /// Token material.
    pub token: SecretString,
    /// Absolute expiration time.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Expose the token material.
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Time remaining until expiry relative to `now`; negative once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of `ensure_valid_session`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Whether a refresh was performed (or joined) to satisfy the call.
    pub refreshed: bool,
}

/// Serializable projection of a privileged operation result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdminOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDescriptor>,
}

impl<T> From<Result<T, crate::error::OperationFailure>> for AdminOutcome<T> {
    fn from(result: Result<T, crate::error::OperationFailure>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(failure) => Self {
                success: false,
                data: None,
                error: Some(failure.descriptor),
            },
        }
    }
}
