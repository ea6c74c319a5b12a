//! Configuration Types
//!
//! Retry, session and top-level resilience configuration.

use std::time::Duration;

use crate::core::MessageCatalog;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per failure identity.
    pub max_attempts: u32,
    /// Delay before the first retry attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

/// Default retry configuration.
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_attempts: 3,
    base_delay: Duration::from_millis(1000),
    max_delay: Duration::from_millis(8000),
};

impl RetryConfig {
    /// Backoff delay before retry attempt `attempt` (1-based).
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        let exponent = attempt.saturating_sub(1);

        let delay_ms = 2u64
            .checked_pow(exponent)
            .and_then(|factor| base_ms.checked_mul(factor))
            .map_or(cap_ms, |ms| ms.min(cap_ms));

        Duration::from_millis(delay_ms)
    }
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Refresh when less than this much time remains before expiry.
    pub refresh_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        DEFAULT_SESSION_CONFIG
    }
}

/// Default session configuration.
pub const DEFAULT_SESSION_CONFIG: SessionConfig = SessionConfig {
    refresh_threshold: Duration::from_secs(300),
};

/// Top-level configuration for the execution layer.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub session: SessionConfig,
    /// User-facing messages per failure kind.
    pub messages: MessageCatalog,
}
