//! Retry Coordination
//!
//! Bounded exponential-backoff retry with attempt bookkeeping keyed by
//! failure identity.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ClassificationContext, FailureClassifier, Sleeper, TokioSleeper};
use crate::error::{OperationError, RetryError, RetryExhaustedError};
use crate::telemetry::{NoOpMetrics, ResilienceMetrics};
use crate::types::{FailureIdentity, FailureKind, FailureReport, RetryConfig};

/// A classified failure together with the raw error it was derived from.
#[derive(Debug)]
pub struct ClassifiedFailure {
    pub report: FailureReport,
    pub error: OperationError,
}

impl ClassifiedFailure {
    pub fn new(report: FailureReport, error: OperationError) -> Self {
        Self { report, error }
    }
}

/// Retry bookkeeping for one failure identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retry attempts consumed; the original attempt is not counted.
    pub attempts: u32,
    /// Retry loops currently running against this identity.
    pub active_loops: u32,
}

/// Retry coordinator.
///
/// State lives in memory only. Concurrent loops on one identity share its
/// budget; the entry is dropped when the last of them ends, however it ends.
pub struct RetryCoordinator {
    config: RetryConfig,
    classifier: FailureClassifier,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<dyn ResilienceMetrics>,
    states: DashMap<FailureIdentity, RetryState>,
}

impl RetryCoordinator {
    /// Create new coordinator.
    pub fn new(config: RetryConfig, classifier: FailureClassifier, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            config,
            classifier,
            sleeper,
            metrics: Arc::new(NoOpMetrics),
            states: DashMap::new(),
        }
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn ResilienceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retry attempts consumed for `identity`.
    pub fn get_retry_count(&self, identity: &FailureIdentity) -> u32 {
        self.states.get(identity).map_or(0, |state| state.attempts)
    }

    /// Drop bookkeeping for `identity`.
    ///
    /// An entry held by a running retry loop is left for that loop to clear.
    pub fn clear_retry_count(&self, identity: &FailureIdentity) {
        self.release(identity);
    }

    /// Drop bookkeeping for every kind of failure of `operation`, except
    /// entries held by a running retry loop.
    pub fn clear_operation(&self, operation: &str) {
        for kind in FailureKind::ALL {
            self.release(&FailureIdentity::derive(operation, kind));
        }
    }

    /// Bookkeeping for `identity`, if any.
    pub fn retry_state(&self, identity: &FailureIdentity) -> Option<RetryState> {
        self.states.get(identity).map(|state| *state)
    }

    /// Delay that will precede the next attempt for `identity`.
    pub fn next_delay(&self, identity: &FailureIdentity) -> Duration {
        self.config
            .delay_for_attempt(self.get_retry_count(identity).saturating_add(1))
    }

    /// Number of identities with live bookkeeping.
    pub fn tracked_identities(&self) -> usize {
        self.states.len()
    }

    /// Consume one retry attempt for the failure's identity.
    ///
    /// Fails with [`RetryError::Exhausted`] (and clears the entry) when the
    /// identity has already used `max_attempts`. A failed attempt leaves the
    /// count in place and returns [`RetryError::AttemptFailed`] with the
    /// reclassified failure.
    pub async fn retry_once<T, F, Fut, A>(
        &self,
        failure: ClassifiedFailure,
        mut operation: F,
        mut on_attempt: A,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        A: FnMut(u32),
    {
        let identity = failure.report.identity.clone();
        self.attempt(&identity, failure, &mut operation, &mut on_attempt)
            .await
    }

    /// Retry until success, exhaustion or a non-recoverable failure.
    ///
    /// Attempts are counted against the identity of `failure` even when a
    /// later attempt fails with a different kind. `on_attempt` receives the
    /// 1-based attempt number before each backoff delay.
    pub async fn retry<T, F, Fut, A>(
        &self,
        failure: ClassifiedFailure,
        mut operation: F,
        mut on_attempt: A,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        A: FnMut(u32),
    {
        if !failure.report.is_recoverable {
            return Err(RetryError::NotRecoverable {
                report: failure.report,
                error: failure.error,
            });
        }

        let identity = failure.report.identity.clone();
        self.states.entry(identity.clone()).or_default().active_loops += 1;
        let _guard = LoopRegistration {
            coordinator: self,
            identity: &identity,
        };

        let mut current = failure;
        loop {
            match self
                .attempt(&identity, current, &mut operation, &mut on_attempt)
                .await
            {
                Err(RetryError::AttemptFailed { report, error, .. }) if report.is_recoverable => {
                    current = ClassifiedFailure::new(report, error);
                }
                Err(RetryError::AttemptFailed { report, error, .. }) => {
                    tracing::debug!(
                        operation = %report.operation,
                        kind = %report.kind,
                        "retry stopped on non-recoverable failure"
                    );
                    return Err(RetryError::NotRecoverable { report, error });
                }
                outcome => return outcome,
            }
        }
    }

    async fn attempt<T, F, Fut, A>(
        &self,
        identity: &FailureIdentity,
        failure: ClassifiedFailure,
        operation: &mut F,
        on_attempt: &mut A,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        A: FnMut(u32),
    {
        let ClassifiedFailure { report, error } = failure;

        if !report.is_recoverable {
            return Err(RetryError::NotRecoverable { report, error });
        }

        let attempt = match self.consume_attempt(identity) {
            Some(attempt) => attempt,
            None => {
                let attempts = self.config.max_attempts;
                self.release(identity);
                self.metrics
                    .record_retry_exhausted(&report.operation, report.kind);
                tracing::warn!(
                    operation = %report.operation,
                    kind = %report.kind,
                    identity = %identity,
                    attempts,
                    error = %error,
                    "retry attempts exhausted"
                );
                return Err(RetryError::Exhausted(RetryExhaustedError {
                    report,
                    attempts,
                    last_error: error,
                }));
            }
        };

        on_attempt(attempt);
        self.metrics.record_retry_attempt(&report.operation, attempt);

        let delay = self.config.delay_for_attempt(attempt);
        tracing::debug!(
            operation = %report.operation,
            kind = %report.kind,
            identity = %identity,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying after failure"
        );
        self.sleeper.sleep(delay).await;

        match operation().await {
            Ok(value) => {
                self.release(identity);
                Ok(value)
            }
            Err(next_error) => {
                let context =
                    ClassificationContext::new(report.operation.clone()).kind_hint(report.kind);
                let next_report = self.classifier.classify(&next_error, &context);
                Err(RetryError::AttemptFailed {
                    attempt,
                    report: next_report,
                    error: next_error,
                })
            }
        }
    }

    /// Increment the attempt counter, or `None` when the ceiling is reached.
    fn consume_attempt(&self, identity: &FailureIdentity) -> Option<u32> {
        let mut state = self.states.entry(identity.clone()).or_default();
        if state.attempts >= self.config.max_attempts {
            return None;
        }
        state.attempts += 1;
        Some(state.attempts)
    }

    /// Remove the entry for `identity` unless a retry loop still holds it.
    fn release(&self, identity: &FailureIdentity) {
        self.states
            .remove_if(identity, |_, state| state.active_loops == 0);
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(
            RetryConfig::default(),
            FailureClassifier::default(),
            Arc::new(TokioSleeper),
        )
    }
}

/// Marks a retry loop as running against an identity. Dropping it, including
/// when the loop's future is dropped mid-flight, releases the entry once no
/// other loop holds it.
struct LoopRegistration<'a> {
    coordinator: &'a RetryCoordinator,
    identity: &'a FailureIdentity,
}

impl Drop for LoopRegistration<'_> {
    fn drop(&mut self) {
        if let Some(mut state) = self.coordinator.states.get_mut(self.identity) {
            state.active_loops = state.active_loops.saturating_sub(1);
        }
        self.coordinator.release(self.identity);
    }
}
