//! Resilience
//!
//! Retry coordination for recoverable failures.
//!
//! This module provides:
//!
//! - **Retry**: Bounded exponential backoff with per-identity bookkeeping

pub mod retry;

pub use retry::{ClassifiedFailure, RetryCoordinator, RetryState};
