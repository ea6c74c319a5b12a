//! Resilient Session Execution Layer
//!
//! Client-side execution policy for remote operations made on behalf of an
//! authenticated principal.
//!
//! # Features
//!
//! - Failure classification into a fixed taxonomy with stable identities
//! - Bounded exponential-backoff retry for recoverable failures
//! - Session expiry checks with single-flight credential refresh
//! - Privilege-verified execution of administrative operations
//! - User-facing failure descriptors from a replaceable message catalog
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use resilient_session::{resilience_config, ResilientOperationRunner, RunOptions, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = resilience_config()
//!         .max_attempts(3)
//!         .refresh_threshold(std::time::Duration::from_secs(300))
//!         .build()?;
//!
//!     let session = Arc::new(SessionManager::new(Arc::new(MyProvider::new()), &config));
//!     let runner = ResilientOperationRunner::builder(config)
//!         .session(session.clone())
//!         .build();
//!
//!     let users = runner
//!         .run(
//!             "load_users",
//!             || api.list_users(),
//!             RunOptions::new().on_retry(|attempt| println!("retry {attempt}")),
//!         )
//!         .await?;
//!
//!     let outcome = session
//!         .execute_admin_outcome("delete_user", || api.delete_user("u-1"))
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: Failure, session, state and configuration types
//! - `error`: Error hierarchy
//! - `core`: Classifier, message catalog, clock and sleeper, credential provider
//! - `resilience`: Retry coordination
//! - `session`: Session manager and privileged operations
//! - `telemetry`: Metrics and error reporting
//! - `builders`: Fluent configuration builder
//! - `runner`: Resilient operation runner combining all of the above

pub mod builders;
pub mod core;
pub mod error;
pub mod resilience;
pub mod runner;
pub mod session;
pub mod telemetry;
pub mod types;

// Re-export main runner
pub use runner::{resilient_runner, ResilientOperationRunner, ResilientOperationRunnerBuilder, RunOptions};

// Re-export builders
pub use builders::{resilience_config, ResilienceConfigBuilder};

// Re-export errors
pub use error::{
    ConfigurationError, FieldError, OperationError, OperationFailure, ResilienceError,
    ResilienceResult, RetryError, RetryExhaustedError, SessionError, TransportFailure,
};

// Re-export types
pub use types::{
    // Config
    ResilienceConfig, RetryConfig, SessionConfig, DEFAULT_RETRY_CONFIG, DEFAULT_SESSION_CONFIG,
    // Failure
    FailureDescriptor, FailureIdentity, FailureKind, FailureReport,
    // Session
    AdminOutcome, Credential, SessionStatus,
    // State
    OperationState,
};

// Re-export core components
pub use core::{
    // Classification
    classify_kind, ClassificationContext, FailureClassifier,
    // Messages
    MessageCatalog, MessageTemplate,
    // Time
    Clock, InstantSleeper, MockClock, RecordingSleeper, Sleeper, SystemClock, TokioSleeper,
    // Provider
    create_mock_credential_provider, CredentialProvider, MockCredentialProvider,
};

// Re-export resilience
pub use resilience::{ClassifiedFailure, RetryCoordinator, RetryState};

// Re-export session
pub use session::SessionManager;

// Re-export telemetry
pub use telemetry::{
    // Metrics
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, ResilienceMetrics,
    // Reporting
    create_in_memory_reporter, report_safely, ErrorReporter, InMemoryReporter, NoOpReporter,
    ReportedFailure, TracingReporter,
};
