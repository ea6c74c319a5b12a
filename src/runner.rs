//! Resilient Operation Runner
//!
//! Entry point for running remote operations: classifies failures, reports
//! them, retries recoverable ones and refreshes the session when a failure
//! says it went stale.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{
    classify_kind, ClassificationContext, Clock, FailureClassifier, MessageCatalog, Sleeper,
    SystemClock, TokioSleeper,
};
use crate::error::{OperationError, OperationFailure, ResilienceError, RetryError};
use crate::resilience::{ClassifiedFailure, RetryCoordinator};
use crate::session::SessionManager;
use crate::telemetry::{report_safely, ErrorReporter, NoOpMetrics, NoOpReporter, ResilienceMetrics};
use crate::types::{FailureKind, FailureReport, OperationState, ResilienceConfig};

/// Per-call options for [`ResilientOperationRunner::run`].
#[derive(Default)]
pub struct RunOptions<'a> {
    kind_hint: Option<FailureKind>,
    on_retry: Option<Box<dyn FnMut(u32) + Send + 'a>>,
    on_state: Option<Box<dyn FnMut(OperationState) + Send + 'a>>,
}

impl<'a> RunOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kind to assume when a failure matches no classification rule.
    pub fn kind_hint(mut self, kind: FailureKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }

    /// Called with the 1-based attempt number before each retry.
    pub fn on_retry(mut self, callback: impl FnMut(u32) + Send + 'a) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    /// Called on every lifecycle transition.
    pub fn on_state(mut self, callback: impl FnMut(OperationState) + Send + 'a) -> Self {
        self.on_state = Some(Box::new(callback));
        self
    }
}

struct StateTracker<'a> {
    current: OperationState,
    on_state: Option<Box<dyn FnMut(OperationState) + Send + 'a>>,
}

impl StateTracker<'_> {
    fn transition(&mut self, next: OperationState) {
        if !self.current.can_transition_to(next) {
            tracing::debug!(from = ?self.current, to = ?next, "unexpected operation state transition");
        }
        self.current = next;
        if let Some(callback) = self.on_state.as_mut() {
            callback(next);
        }
    }
}

/// Resilient operation runner.
pub struct ResilientOperationRunner {
    classifier: FailureClassifier,
    retry: Arc<RetryCoordinator>,
    session: Option<Arc<SessionManager>>,
    messages: MessageCatalog,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<dyn ResilienceMetrics>,
}

impl ResilientOperationRunner {
    /// Create a runner with default collaborators and no session manager.
    pub fn new(config: ResilienceConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building a runner.
    pub fn builder(config: ResilienceConfig) -> ResilientOperationRunnerBuilder {
        ResilientOperationRunnerBuilder::new(config)
    }

    /// Retry bookkeeping shared by every run.
    pub fn retry_coordinator(&self) -> &RetryCoordinator {
        &self.retry
    }

    /// Session manager consulted on session failures, if any.
    pub fn session(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    /// Run `operation` under the execution policy.
    ///
    /// A failure is classified, reported and, when recoverable, retried with
    /// backoff until it succeeds or the retry budget for its identity runs
    /// out. Once any attempt fails with a session failure the session is
    /// marked stale, and every later attempt first ensures a valid session
    /// before `operation` is invoked. Non-recoverable failures are returned
    /// immediately without retry.
    pub async fn run<T, F, Fut, E>(
        &self,
        name: &str,
        mut operation: F,
        options: RunOptions<'_>,
    ) -> Result<T, OperationFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationError>,
    {
        let RunOptions {
            kind_hint,
            mut on_retry,
            on_state,
        } = options;
        let tracker = Mutex::new(StateTracker {
            current: OperationState::Initial,
            on_state,
        });

        tracker.lock().transition(OperationState::Running);
        let error: OperationError = match operation().await {
            Ok(value) => {
                tracker.lock().transition(OperationState::Succeeded);
                self.retry.clear_operation(name);
                return Ok(value);
            }
            Err(error) => error.into(),
        };

        let mut context = ClassificationContext::new(name);
        if let Some(kind) = kind_hint {
            context = context.kind_hint(kind);
        }
        let report = self.classifier.classify(&error, &context);
        self.record(&report, &error);

        if !report.is_recoverable {
            tracker.lock().transition(OperationState::FailedTerminal);
            return Err(self.failure(report, ResilienceError::Operation(error)));
        }
        tracker.lock().transition(OperationState::FailedRecoverable);

        let session = self.session.as_deref();
        let needs_session = AtomicBool::new(false);
        if let (Some(session), FailureKind::Session) = (session, report.kind) {
            session.mark_stale();
            needs_session.store(true, Ordering::SeqCst);
        }

        let first = report.identity.clone();
        let pending = Mutex::new(operation);
        let (pending, needs_session, state) = (&pending, &needs_session, &tracker);
        let outcome = self
            .retry
            .retry(
                ClassifiedFailure::new(report, error),
                move || {
                    state.lock().transition(OperationState::Running);
                    async move {
                        if let Some(session) = session {
                            if needs_session.load(Ordering::SeqCst) {
                                if let Err(error) = session.ensure_valid_session().await {
                                    return Err(OperationError::from(error));
                                }
                            }
                        }

                        // Built only after the session check so the attempt
                        // sees the refreshed credential.
                        let attempt = {
                            let mut operation = pending.lock();
                            (*operation)()
                        };
                        let result = attempt.await.map_err(Into::<OperationError>::into);

                        if let (Err(error), Some(session)) = (&result, session) {
                            if classify_kind(error) == FailureKind::Session {
                                session.mark_stale();
                                needs_session.store(true, Ordering::SeqCst);
                            }
                        }
                        result
                    }
                },
                |attempt| {
                    let mut tracker = tracker.lock();
                    if tracker.current == OperationState::Running {
                        tracker.transition(OperationState::FailedRecoverable);
                    }
                    tracker.transition(OperationState::Retrying);
                    drop(tracker);

                    if let Some(callback) = on_retry.as_mut() {
                        callback(attempt);
                    }
                },
            )
            .await;

        match outcome {
            Ok(value) => {
                tracker.lock().transition(OperationState::Succeeded);
                self.retry.clear_operation(name);
                Ok(value)
            }
            Err(error) => {
                let exhausted = matches!(error, RetryError::Exhausted(_));
                let (report, cause) = error.into_parts();

                let mut tracker = tracker.lock();
                if exhausted {
                    if tracker.current == OperationState::Running {
                        tracker.transition(OperationState::FailedRecoverable);
                    }
                    tracker.transition(OperationState::Exhausted);
                } else {
                    tracker.transition(OperationState::FailedTerminal);
                }
                drop(tracker);

                if report.identity != first {
                    if let Some(raw) = cause.operation_error() {
                        self.record(&report, raw);
                    }
                }
                Err(self.failure(report, cause))
            }
        }
    }

    fn record(&self, report: &FailureReport, error: &OperationError) {
        tracing::debug!(
            operation = %report.operation,
            kind = %report.kind,
            recoverable = report.is_recoverable,
            "operation failed"
        );
        self.metrics.record_failure(&report.operation, report.kind);
        report_safely(self.reporter.as_ref(), report, error);
    }

    fn failure(&self, report: FailureReport, cause: ResilienceError) -> OperationFailure {
        OperationFailure {
            descriptor: self.messages.describe(&report),
            report,
            cause,
        }
    }
}

/// Builder for [`ResilientOperationRunner`].
pub struct ResilientOperationRunnerBuilder {
    config: ResilienceConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    session: Option<Arc<SessionManager>>,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<dyn ResilienceMetrics>,
}

impl ResilientOperationRunnerBuilder {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            session: None,
            reporter: Arc::new(NoOpReporter),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Clock used to timestamp failure reports.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sleeper used for retry backoff.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Session manager to refresh on session failures.
    pub fn session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn ResilienceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> ResilientOperationRunner {
        let classifier = FailureClassifier::new(self.clock);
        let retry = RetryCoordinator::new(self.config.retry, classifier.clone(), self.sleeper)
            .with_metrics(self.metrics.clone());

        ResilientOperationRunner {
            classifier,
            retry: Arc::new(retry),
            session: self.session,
            messages: self.config.messages,
            reporter: self.reporter,
            metrics: self.metrics,
        }
    }
}

/// Create a runner with default collaborators.
pub fn resilient_runner(config: ResilienceConfig) -> ResilientOperationRunner {
    ResilientOperationRunner::new(config)
}
