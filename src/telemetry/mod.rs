//! Telemetry
//!
//! Observability components for the execution layer.
//!
//! This module provides:
//!
//! - **Metrics**: Failure, retry and refresh counters
//! - **Reporting**: Fire-and-forget error-reporting sink
//!
//! Structured logging goes through `tracing` directly.

pub mod metrics;
pub mod reporting;

// Metrics
pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, ResilienceMetrics,
};

// Reporting
pub use reporting::{
    create_in_memory_reporter, report_safely, ErrorReporter, InMemoryReporter, NoOpReporter,
    ReportedFailure, TracingReporter,
};
