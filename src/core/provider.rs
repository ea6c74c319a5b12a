//! Credential Provider
//!
//! Interface to the collaborator that owns credential acquisition, refresh and
//! privilege lookup.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::SessionError;
use crate::types::Credential;

/// Credential provider interface (for dependency injection).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Credential currently held by the provider, if any.
    async fn current_credential(&self) -> Result<Option<Credential>, SessionError>;

    /// Exchange the current credential for a fresh one.
    async fn refresh_credential(&self) -> Result<Credential, SessionError>;

    /// Whether the current principal may perform privileged operations.
    async fn principal_privilege(&self) -> Result<bool, SessionError>;
}

/// Mock credential provider for testing.
pub struct MockCredentialProvider {
    current: Mutex<Option<Credential>>,
    refreshed: Mutex<Option<Credential>>,
    next_refresh_error: Mutex<Option<SessionError>>,
    next_privilege_error: Mutex<Option<SessionError>>,
    privileged: Mutex<bool>,
    refresh_delay: Mutex<Duration>,
    current_calls: AtomicU32,
    refresh_calls: AtomicU32,
    privilege_calls: AtomicU32,
}

impl MockCredentialProvider {
    /// Create new mock provider with no credential and a privileged principal.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            refreshed: Mutex::new(None),
            next_refresh_error: Mutex::new(None),
            next_privilege_error: Mutex::new(None),
            privileged: Mutex::new(true),
            refresh_delay: Mutex::new(Duration::ZERO),
            current_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            privilege_calls: AtomicU32::new(0),
        }
    }

    /// Set the current credential.
    pub fn set_current(&self, credential: Credential) -> &Self {
        *self.current.lock() = Some(credential);
        self
    }

    /// Set the credential returned by every refresh.
    pub fn set_refreshed(&self, credential: Credential) -> &Self {
        *self.refreshed.lock() = Some(credential);
        self
    }

    /// Fail the next refresh with `error`.
    pub fn set_next_refresh_error(&self, error: SessionError) -> &Self {
        *self.next_refresh_error.lock() = Some(error);
        self
    }

    /// Fail the next privilege lookup with `error`.
    pub fn set_next_privilege_error(&self, error: SessionError) -> &Self {
        *self.next_privilege_error.lock() = Some(error);
        self
    }

    /// Set whether the principal is privileged.
    pub fn set_privileged(&self, privileged: bool) -> &Self {
        *self.privileged.lock() = privileged;
        self
    }

    /// Make each refresh take `delay` before completing.
    pub fn set_refresh_delay(&self, delay: Duration) -> &Self {
        *self.refresh_delay.lock() = delay;
        self
    }

    /// Number of `current_credential` calls.
    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh_credential` calls.
    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of `principal_privilege` calls.
    pub fn privilege_calls(&self) -> u32 {
        self.privilege_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn current_credential(&self) -> Result<Option<Credential>, SessionError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().clone())
    }

    async fn refresh_credential(&self) -> Result<Credential, SessionError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_refresh_error.lock().take() {
            return Err(error);
        }

        let credential = self.refreshed.lock().clone().unwrap_or_else(|| {
            Credential::new(
                format!("refreshed-token-{}", call),
                chrono::Utc::now() + chrono::Duration::hours(1),
            )
        });
        *self.current.lock() = Some(credential.clone());
        Ok(credential)
    }

    async fn principal_privilege(&self) -> Result<bool, SessionError> {
        self.privilege_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_privilege_error.lock().take() {
            return Err(error);
        }
        Ok(*self.privileged.lock())
    }
}

/// Create mock credential provider for testing.
pub fn create_mock_credential_provider() -> MockCredentialProvider {
    MockCredentialProvider::new()
}
