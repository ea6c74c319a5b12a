//! Error Reporting
//!
//! Fire-and-forget sink for classified failures.

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};

use crate::error::OperationError;
use crate::types::FailureReport;

/// Error-reporting sink.
///
/// Implementations must not block; a panicking reporter is contained by
/// [`report_safely`].
#[cfg_attr(test, mockall::automock)]
pub trait ErrorReporter: Send + Sync {
    /// Report a classified failure together with its raw error.
    fn report(&self, report: &FailureReport, error: &OperationError);
}

/// Deliver a report, swallowing any panic raised by the sink.
pub fn report_safely(reporter: &dyn ErrorReporter, report: &FailureReport, error: &OperationError) {
    let delivered = panic::catch_unwind(AssertUnwindSafe(|| reporter.report(report, error)));
    if delivered.is_err() {
        tracing::error!(
            operation = %report.operation,
            identity = %report.identity,
            "error reporter panicked; report dropped"
        );
    }
}

/// Reporter that discards everything.
pub struct NoOpReporter;

impl ErrorReporter for NoOpReporter {
    fn report(&self, _report: &FailureReport, _error: &OperationError) {}
}

/// Reporter that emits a `tracing` event per failure.
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &FailureReport, error: &OperationError) {
        tracing::warn!(
            operation = %report.operation,
            kind = %report.kind,
            identity = %report.identity,
            recoverable = report.is_recoverable,
            error = %error,
            "operation failed"
        );
    }
}

/// Reported failure for in-memory storage.
#[derive(Debug, Clone)]
pub struct ReportedFailure {
    pub report: FailureReport,
    pub error_message: String,
}

/// In-memory reporter for testing.
#[derive(Default)]
pub struct InMemoryReporter {
    entries: Mutex<Vec<ReportedFailure>>,
}

impl InMemoryReporter {
    /// Create new in-memory reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all reported failures.
    pub fn get_entries(&self) -> Vec<ReportedFailure> {
        self.entries.lock().clone()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl ErrorReporter for InMemoryReporter {
    fn report(&self, report: &FailureReport, error: &OperationError) {
        self.entries.lock().push(ReportedFailure {
            report: report.clone(),
            error_message: error.to_string(),
        });
    }
}

/// Create in-memory reporter for testing.
pub fn create_in_memory_reporter() -> InMemoryReporter {
    InMemoryReporter::new()
}
