//! Builders
//!
//! Fluent builder for the execution-layer configuration.

pub mod config;

pub use config::{resilience_config, ResilienceConfigBuilder};
