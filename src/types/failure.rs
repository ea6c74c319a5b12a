//! Failure Types
//!
//! Failure taxonomy, stable failure identity and the classified failure report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Closed set of failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport failure (connection refused, DNS, timeout).
    Network,
    /// Credentials rejected outright.
    Auth,
    /// Expired or invalid session/token.
    Session,
    /// Field or shape validation failure.
    Validation,
    /// Valid principal lacking the required privilege.
    Permission,
    /// Downstream service reported a server-side failure.
    Upstream,
    /// Anything unclassifiable.
    Unknown,
}

impl FailureKind {
    /// Every kind, in declaration order.
    pub const ALL: [FailureKind; 7] = [
        Self::Network,
        Self::Auth,
        Self::Session,
        Self::Validation,
        Self::Permission,
        Self::Upstream,
        Self::Unknown,
    ];

    /// Whether failures of this kind are retried automatically.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network | Self::Session | Self::Upstream)
    }

    /// Key into the user-facing message table.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Network => "error.network",
            Self::Auth => "error.auth",
            Self::Session => "error.session",
            Self::Validation => "error.validation",
            Self::Permission => "error.permission",
            Self::Upstream => "error.upstream",
            Self::Unknown => "error.unknown",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Session => "session",
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::Upstream => "upstream",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a logical failure.
///
/// Derived from the operation name and the failure kind only, so message
/// variations between attempts (request ids, timestamps) map to the same
/// retry bookkeeping entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureIdentity(String);

impl FailureIdentity {
    /// Derive the identity for an operation/kind pair.
    pub fn derive(operation: &str, kind: FailureKind) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0x1f]);
        hasher.update(kind.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classified failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// Join key for retry bookkeeping; never regenerated per attempt.
    pub identity: FailureIdentity,
    /// Failure category.
    pub kind: FailureKind,
    /// Whether the failure is retried automatically.
    pub is_recoverable: bool,
    /// Key into the user-facing message table.
    pub message_key: &'static str,
    /// Name of the operation that failed.
    pub operation: String,
    /// When the failure was classified.
    pub occurred_at: DateTime<Utc>,
    /// Raw failure text, for logs only.
    #[serde(skip)]
    pub detail: String,
}

impl FailureReport {
    /// Build a report for a kind, deriving identity and recoverability.
    pub fn new(
        operation: impl Into<String>,
        kind: FailureKind,
        detail: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let operation = operation.into();
        Self {
            identity: FailureIdentity::derive(&operation, kind),
            kind,
            is_recoverable: kind.is_recoverable(),
            message_key: kind.message_key(),
            operation,
            occurred_at,
            detail: detail.into(),
        }
    }
}

/// User-facing failure description.
///
/// The only failure data the presentation layer receives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDescriptor {
    pub title: String,
    pub message: String,
    pub can_retry_manually: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        let recoverable: Vec<_> = FailureKind::ALL
            .iter()
            .filter(|k| k.is_recoverable())
            .copied()
            .collect();
        assert_eq!(
            recoverable,
            vec![FailureKind::Network, FailureKind::Session, FailureKind::Upstream]
        );
    }

    #[test]
    fn test_identity_is_stable() {
        let a = FailureIdentity::derive("load_users", FailureKind::Network);
        let b = FailureIdentity::derive("load_users", FailureKind::Network);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 24);
    }

    #[test]
    fn test_identity_differs_by_kind_and_operation() {
        let network = FailureIdentity::derive("load_users", FailureKind::Network);
        let upstream = FailureIdentity::derive("load_users", FailureKind::Upstream);
        let other = FailureIdentity::derive("save_user", FailureKind::Network);
        assert_ne!(network, upstream);
        assert_ne!(network, other);
    }

    #[test]
    fn test_report_ignores_detail_for_identity() {
        let now = Utc::now();
        let first = FailureReport::new("load_users", FailureKind::Upstream, "req-1 failed", now);
        let second = FailureReport::new("load_users", FailureKind::Upstream, "req-2 failed", now);
        assert_eq!(first.identity, second.identity);
        assert!(first.is_recoverable);
        assert_eq!(first.message_key, "error.upstream");
    }

    #[test]
    fn test_report_serialization_hides_detail() {
        let report = FailureReport::new("load_users", FailureKind::Permission, "secret", Utc::now());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "permission");
        assert_eq!(json["isRecoverable"], false);
        assert!(json.get("detail").is_none());
    }
}
