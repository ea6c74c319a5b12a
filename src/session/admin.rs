//! Privileged Operations
//!
//! Bounded execution of operations that need a fresh, privileged session.

use std::future::Future;

use crate::core::ClassificationContext;
use crate::error::{OperationError, OperationFailure, ResilienceError, SessionError};
use crate::session::SessionManager;
use crate::telemetry::report_safely;
use crate::types::{AdminOutcome, FailureDescriptor, FailureKind, FailureReport};

impl SessionManager {
    /// Run a privileged operation.
    ///
    /// Privilege is verified before every attempt. When either that check or
    /// the operation fails with a session-kind error (a failed refresh, an
    /// expired token) the session is marked stale, the loop backs off and the
    /// next attempt re-verifies. A denial, a missing session, any other
    /// failure, or running out of attempts ends the call.
    pub async fn execute_admin_operation<T, F, Fut, E>(
        &self,
        name: &str,
        mut operation: F,
    ) -> Result<T, OperationFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationError>,
    {
        let context = ClassificationContext::new(name);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let (error, denied) = match self.ensure_admin_access().await {
                Err(denied) => (OperationError::from(denied.clone()), Some(denied)),
                Ok(()) => match operation().await {
                    Ok(value) => return Ok(value),
                    Err(error) => (error.into(), None),
                },
            };
            let report = self.classifier.classify(&error, &context);

            // A missing session cannot be fixed by refreshing.
            let retryable = report.kind == FailureKind::Session
                && !matches!(denied, Some(SessionError::NoSession))
                && attempt < max_attempts;

            if retryable {
                let delay = self.retry.delay_for_attempt(attempt);
                tracing::debug!(
                    operation = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "privileged operation hit a session failure, refreshing"
                );
                self.mark_stale();
                self.sleeper.sleep(delay).await;
                attempt += 1;
                continue;
            }

            let descriptor = self.record_failure(&report, &error);
            let cause = match denied {
                Some(denied) => ResilienceError::Session(denied),
                None => ResilienceError::Operation(error),
            };
            return Err(OperationFailure {
                descriptor,
                report,
                cause,
            });
        }
    }

    /// [`execute_admin_operation`](Self::execute_admin_operation), projected
    /// into the `{success, data, error}` shape the presentation layer consumes.
    pub async fn execute_admin_outcome<T, F, Fut, E>(&self, name: &str, operation: F) -> AdminOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationError>,
    {
        self.execute_admin_operation(name, operation).await.into()
    }

    fn record_failure(&self, report: &FailureReport, raw: &OperationError) -> FailureDescriptor {
        self.metrics.record_failure(&report.operation, report.kind);
        report_safely(self.reporter.as_ref(), report, raw);
        self.messages.describe(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MockClock, MockCredentialProvider, RecordingSleeper};
    use crate::telemetry::InMemoryReporter;
    use crate::types::{Credential, ResilienceConfig};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        provider: Arc<MockCredentialProvider>,
        sleeper: Arc<RecordingSleeper>,
        reporter: Arc<InMemoryReporter>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let now = Utc::now();
        let provider = Arc::new(MockCredentialProvider::new());
        provider.set_current(Credential::new("initial", now + ChronoDuration::hours(1)));
        provider.set_refreshed(Credential::new("fresh", now + ChronoDuration::hours(2)));

        let sleeper = Arc::new(RecordingSleeper::new());
        let reporter = Arc::new(InMemoryReporter::new());
        let manager = SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(Arc::new(MockClock::new(now)))
            .with_sleeper(sleeper.clone())
            .with_reporter(reporter.clone());

        Fixture {
            provider,
            sleeper,
            reporter,
            manager,
        }
    }

    #[tokio::test]
    async fn test_admin_operation_success() {
        let f = fixture();

        let result = f
            .manager
            .execute_admin_operation("delete_post", || async { Ok::<_, OperationError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(f.provider.privilege_calls(), 1);
        assert!(f.reporter.get_entries().is_empty());
    }

    #[tokio::test]
    async fn test_unprivileged_principal_is_denied_without_running() {
        let f = fixture();
        f.provider.set_privileged(false);
        let calls = AtomicU32::new(0);

        let result = f
            .manager
            .execute_admin_operation("delete_post", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>(()) }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.report.kind, FailureKind::Permission);
        assert!(!failure.descriptor.can_retry_manually);
        assert!(matches!(
            failure.cause,
            ResilienceError::Session(SessionError::InsufficientPrivilege)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.provider.privilege_calls(), 1);
        assert_eq!(f.reporter.get_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_session_rejection_refreshes_and_retries() {
        let f = fixture();
        let calls = AtomicU32::new(0);

        let result = f
            .manager
            .execute_admin_operation("update_role", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OperationError::new("JWT expired").with_status(401))
                    } else {
                        Ok("updated")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "updated");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.provider.refresh_calls(), 1);
        assert_eq!(f.sleeper.delays(), vec![Duration::from_millis(1000)]);
        assert_eq!(f.manager.current_credential().unwrap().token(), "fresh");
    }

    #[tokio::test]
    async fn test_session_rejection_is_bounded() {
        let f = fixture();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = f
            .manager
            .execute_admin_operation("update_role", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(OperationError::new("invalid token")) }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.report.kind, FailureKind::Session);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            f.sleeper.delays(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_retried() {
        let f = fixture();
        f.manager.mark_stale();
        f.provider.set_next_refresh_error(SessionError::RefreshFailed {
            message: "temporarily unavailable".to_string(),
        });
        let calls = AtomicU32::new(0);

        let result = f
            .manager
            .execute_admin_operation("update_role", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>("updated") }
            })
            .await;

        assert_eq!(result.unwrap(), "updated");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.provider.refresh_calls(), 2);
        assert_eq!(f.sleeper.delays(), vec![Duration::from_millis(1000)]);
        assert_eq!(f.manager.current_credential().unwrap().token(), "fresh");
        assert!(f.reporter.get_entries().is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_is_not_retried() {
        let f = fixture();
        f.manager.clear_session();
        let calls = AtomicU32::new(0);

        let result = f
            .manager
            .execute_admin_operation("update_role", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>(()) }
            })
            .await;

        let failure = result.unwrap_err();
        assert!(matches!(
            failure.cause,
            ResilienceError::Session(SessionError::NoSession)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.provider.refresh_calls(), 0);
        assert!(f.sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let f = fixture();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = f
            .manager
            .execute_admin_operation("update_role", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(OperationError::new("connection refused")) }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.report.kind, FailureKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(f.sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_admin_outcome_projection() {
        let f = fixture();
        f.provider.set_privileged(false);

        let outcome = f
            .manager
            .execute_admin_outcome("delete_post", || async { Ok::<_, OperationError>(1) })
            .await;

        assert!(!outcome.success);
        assert!(outcome.data.is_none());
        assert_eq!(outcome.error.unwrap().title, "Access denied");
    }
}
