//! Configuration Builder
//!
//! Fluent builder for the execution-layer configuration.

use std::time::Duration;

use crate::core::{MessageCatalog, MessageTemplate};
use crate::error::{ConfigurationError, ResilienceError};
use crate::types::{
    FailureKind, ResilienceConfig, RetryConfig, SessionConfig, DEFAULT_RETRY_CONFIG,
    DEFAULT_SESSION_CONFIG,
};

/// Resilience configuration builder.
pub struct ResilienceConfigBuilder {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    refresh_threshold: Duration,
    messages: MessageCatalog,
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceConfigBuilder {
    /// Create new configuration builder with default values.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_CONFIG.max_attempts,
            base_delay: DEFAULT_RETRY_CONFIG.base_delay,
            max_delay: DEFAULT_RETRY_CONFIG.max_delay,
            refresh_threshold: DEFAULT_SESSION_CONFIG.refresh_threshold,
            messages: MessageCatalog::english(),
        }
    }

    /// Set maximum retry attempts per failure identity.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set cap on any single retry delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set how close to expiry a session may get before it is refreshed.
    pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Replace the message catalog.
    pub fn messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = messages;
        self
    }

    /// Override the message shown for one failure kind.
    pub fn message(mut self, kind: FailureKind, template: MessageTemplate) -> Self {
        self.messages = self.messages.with_message(kind.message_key(), template);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ResilienceConfig, ResilienceError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }

        if self.base_delay.is_zero() {
            return Err(invalid("base_delay must be greater than zero"));
        }

        if self.max_delay < self.base_delay {
            return Err(invalid("max_delay must not be less than base_delay"));
        }

        Ok(ResilienceConfig {
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            },
            session: SessionConfig {
                refresh_threshold: self.refresh_threshold,
            },
            messages: self.messages,
        })
    }
}

fn invalid(message: &str) -> ResilienceError {
    ResilienceError::Configuration(ConfigurationError::InvalidConfig {
        message: message.to_string(),
    })
}

/// Create a new resilience configuration builder.
pub fn resilience_config() -> ResilienceConfigBuilder {
    ResilienceConfigBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = resilience_config().build().unwrap();

        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.session, SessionConfig::default());
        assert!(config.messages.get("error.network").is_some());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ResilienceConfigBuilder::new()
            .max_attempts(5)
            .base_delay(Duration::from_millis(200))
            .max_delay(Duration::from_secs(2))
            .refresh_threshold(Duration::from_secs(60))
            .message(
                FailureKind::Upstream,
                MessageTemplate::new("Server trouble", "Try again shortly."),
            )
            .build()
            .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(config.session.refresh_threshold, Duration::from_secs(60));
        assert_eq!(
            config.messages.get("error.upstream").unwrap().title,
            "Server trouble"
        );
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let result = resilience_config().max_attempts(0).build();

        assert!(matches!(
            result,
            Err(ResilienceError::Configuration(ConfigurationError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_builder_rejects_zero_base_delay() {
        let result = resilience_config().base_delay(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_cap_below_base() {
        let result = resilience_config()
            .base_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }
}
