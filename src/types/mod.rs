//! Types
//!
//! Data structures shared across the execution layer.

pub mod config;
pub mod failure;
pub mod session;
pub mod state;

pub use config::{
    ResilienceConfig, RetryConfig, SessionConfig, DEFAULT_RETRY_CONFIG, DEFAULT_SESSION_CONFIG,
};
pub use failure::{FailureDescriptor, FailureIdentity, FailureKind, FailureReport};
pub use session::{AdminOutcome, Credential, SessionStatus};
pub use state::OperationState;
