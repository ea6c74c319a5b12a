//! Integration tests for the runner, single-flight session refresh and
//! privileged operations.

use chrono::{Duration as ChronoDuration, Utc};
use resilient_session::{
    resilience_config, Credential, FailureKind, InMemoryMetrics, InMemoryReporter, MockClock,
    MockCredentialProvider, OperationError, RecordingSleeper, ResilienceConfig, ResilienceError,
    ResilientOperationRunner, RunOptions, SessionError, SessionManager,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn provider_expiring_in(seconds: i64, now: chrono::DateTime<Utc>) -> Arc<MockCredentialProvider> {
    let provider = Arc::new(MockCredentialProvider::new());
    provider.set_current(Credential::new("initial", now + ChronoDuration::seconds(seconds)));
    provider.set_refreshed(Credential::new("fresh", now + ChronoDuration::hours(1)));
    provider
}

#[tokio::test]
async fn test_recoverable_failures_retry_then_succeed() {
    // Arrange
    let sleeper = Arc::new(RecordingSleeper::new());
    let runner = ResilientOperationRunner::builder(ResilienceConfig::default())
        .sleeper(sleeper.clone())
        .build();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let mut attempts = Vec::new();

    // Act - fail twice with a network error, then succeed
    let result = runner
        .run(
            "load_dashboard",
            || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(OperationError::new("getaddrinfo ENOTFOUND api.example.com"))
                    } else {
                        Ok("dashboard")
                    }
                }
            },
            RunOptions::new().on_retry(|attempt| attempts.push(attempt)),
        )
        .await;

    // Assert
    assert_eq!(result.unwrap(), "dashboard");
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
}

#[tokio::test]
async fn test_permission_failure_rejects_immediately() {
    // Arrange
    let sleeper = Arc::new(RecordingSleeper::new());
    let reporter = Arc::new(InMemoryReporter::new());
    let runner = ResilientOperationRunner::builder(ResilienceConfig::default())
        .sleeper(sleeper.clone())
        .reporter(reporter.clone())
        .build();
    let mut attempts = Vec::new();

    // Act
    let result: Result<(), _> = runner
        .run(
            "delete_post",
            || async { Err(OperationError::new("permission denied for table posts")) },
            RunOptions::new().on_retry(|attempt| attempts.push(attempt)),
        )
        .await;

    // Assert
    let failure = result.unwrap_err();
    assert_eq!(failure.report.kind, FailureKind::Permission);
    assert!(!failure.report.is_recoverable);
    assert_eq!(failure.descriptor.title, "Access denied");
    assert!(attempts.is_empty());
    assert!(sleeper.delays().is_empty());

    let reported = reporter.get_entries();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].report.operation, "delete_post");
}

#[tokio::test]
async fn test_exhausted_retry_surfaces_last_error() {
    // Arrange
    let config = resilience_config()
        .max_attempts(2)
        .base_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let metrics = Arc::new(InMemoryMetrics::new());
    let runner = ResilientOperationRunner::builder(config)
        .sleeper(Arc::new(RecordingSleeper::new()))
        .metrics(metrics.clone())
        .build();

    // Act
    let result: Result<(), _> = runner
        .run(
            "sync_inbox",
            || async { Err(OperationError::new("upstream error").with_status(502)) },
            RunOptions::new(),
        )
        .await;

    // Assert
    let failure = result.unwrap_err();
    assert!(matches!(failure.cause, ResilienceError::RetryExhausted(_)));
    assert_eq!(
        failure.cause.operation_error().and_then(|e| e.status()),
        Some(502)
    );
    assert_eq!(metrics.total("resilience_retry_attempts_total"), 2.0);
    assert_eq!(runner.retry_coordinator().tracked_identities(), 0);
}

#[tokio::test]
async fn test_admin_operations_share_one_refresh() {
    // Arrange - 100 seconds left, below the 300 second threshold
    let now = Utc::now();
    let clock = Arc::new(MockClock::new(now));
    let provider = provider_expiring_in(100, now);
    provider.set_refresh_delay(Duration::from_millis(50));
    let manager = Arc::new(
        SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(clock.clone()),
    );

    // Act - two privileged operations started 1ms apart while the refresh runs
    let first = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .execute_admin_operation("promote_user", || async { Ok::<_, OperationError>(1) })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    clock.advance(ChronoDuration::milliseconds(1));
    assert!(manager.refresh_in_flight());

    let second = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .execute_admin_operation("demote_user", || async { Ok::<_, OperationError>(2) })
                .await
        })
    };

    // Assert
    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert_eq!(second.await.unwrap().unwrap(), 2);
    assert_eq!(provider.refresh_calls(), 1);
    assert_eq!(provider.privilege_calls(), 2);
    assert_eq!(manager.current_credential().unwrap().token(), "fresh");
}

#[tokio::test]
async fn test_concurrent_callers_single_flight() {
    // Arrange
    let now = Utc::now();
    let provider = provider_expiring_in(60, now);
    provider.set_refresh_delay(Duration::from_millis(50));
    let metrics = Arc::new(InMemoryMetrics::new());
    let manager = Arc::new(
        SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(Arc::new(MockClock::new(now)))
            .with_metrics(metrics.clone()),
    );

    // Act
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_valid_session().await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // Assert
    assert!(results.iter().all(|r| matches!(r, Ok(status) if status.refreshed)));
    assert_eq!(provider.refresh_calls(), 1);
    assert_eq!(metrics.total("session_refreshes_total"), 1.0);
    assert_eq!(metrics.total("session_refresh_joined_total"), 9.0);
    assert!(!manager.refresh_in_flight());
}

#[tokio::test]
async fn test_cancelled_initiator_does_not_abort_refresh() {
    // Arrange
    let now = Utc::now();
    let provider = provider_expiring_in(10, now);
    provider.set_refresh_delay(Duration::from_millis(50));
    let manager = Arc::new(
        SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(Arc::new(MockClock::new(now))),
    );

    // Act - start a refresh, then abort the task that started it
    let initiator = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_valid_session().await })
    };
    while !manager.refresh_in_flight() {
        tokio::task::yield_now().await;
    }
    initiator.abort();
    assert!(initiator.await.unwrap_err().is_cancelled());

    let status = manager.ensure_valid_session().await;

    // Assert
    assert!(status.unwrap().refreshed);
    assert_eq!(provider.refresh_calls(), 1);
    assert_eq!(manager.current_credential().unwrap().token(), "fresh");
    assert!(!manager.refresh_in_flight());
}

#[tokio::test]
async fn test_failed_refresh_reaches_every_waiter() {
    // Arrange
    let now = Utc::now();
    let provider = provider_expiring_in(10, now);
    provider.set_refresh_delay(Duration::from_millis(20));
    provider.set_next_refresh_error(SessionError::RefreshFailed {
        message: "refresh token revoked".to_string(),
    });
    let manager = Arc::new(
        SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(Arc::new(MockClock::new(now))),
    );

    // Act
    let (a, b) = tokio::join!(manager.ensure_valid_session(), manager.ensure_valid_session());

    // Assert
    let expected = SessionError::RefreshFailed {
        message: "refresh token revoked".to_string(),
    };
    assert_eq!(a.unwrap_err(), expected);
    assert_eq!(b.unwrap_err(), expected);
    assert_eq!(provider.refresh_calls(), 1);

    // A later call starts a new refresh
    assert!(manager.ensure_valid_session().await.unwrap().refreshed);
    assert_eq!(provider.refresh_calls(), 2);
}

#[tokio::test]
async fn test_runner_refreshes_session_on_session_failure() {
    // Arrange
    let now = Utc::now();
    let provider = provider_expiring_in(3600, now);
    let session = Arc::new(
        SessionManager::new(provider.clone(), &ResilienceConfig::default())
            .with_clock(Arc::new(MockClock::new(now))),
    );
    let runner = ResilientOperationRunner::builder(ResilienceConfig::default())
        .sleeper(Arc::new(RecordingSleeper::new()))
        .session(session.clone())
        .build();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    // Act
    let result = runner
        .run(
            "load_profile",
            || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OperationError::new("Invalid Refresh Token: Already Used"))
                    } else {
                        Ok(n)
                    }
                }
            },
            RunOptions::new(),
        )
        .await;

    // Assert
    assert_eq!(result.unwrap(), 1);
    assert_eq!(provider.refresh_calls(), 1);
    assert_eq!(session.current_credential().unwrap().token(), "fresh");
}

#[tokio::test]
async fn test_admin_outcome_shape() {
    // Arrange
    let now = Utc::now();
    let provider = provider_expiring_in(3600, now);
    let manager = SessionManager::new(provider.clone(), &ResilienceConfig::default())
        .with_clock(Arc::new(MockClock::new(now)));

    // Act
    let outcome = manager
        .execute_admin_outcome("list_audit_log", || async {
            Ok::<_, OperationError>(vec!["entry"])
        })
        .await;

    // Assert
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"][0], "entry");
}
