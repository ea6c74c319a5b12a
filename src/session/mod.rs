//! Session Management
//!
//! Session lifecycle for the authenticated principal.
//!
//! This module provides:
//!
//! - **Session Manager**: Expiry checks, single-flight refresh, privilege checks
//! - **Privileged Operations**: Bounded execution behind a verified session

pub mod admin;
pub mod manager;

pub use manager::SessionManager;
