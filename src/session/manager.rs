//! Session Manager
//!
//! Owns the process-wide session: expiry checks, single-flight refresh and
//! privilege verification.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::core::{
    Clock, CredentialProvider, FailureClassifier, MessageCatalog, Sleeper, SystemClock,
    TokioSleeper,
};
use crate::error::SessionError;
use crate::telemetry::{ErrorReporter, NoOpMetrics, NoOpReporter, ResilienceMetrics};
use crate::types::{Credential, ResilienceConfig, RetryConfig, SessionConfig, SessionStatus};

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, SessionError>>>;

struct InFlightRefresh {
    generation: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct SessionSlot {
    credential: Option<Credential>,
    /// The provider's credential has been read once.
    seeded: bool,
    /// Server-side rejection observed; refresh regardless of expiry.
    stale: bool,
    privilege_verified: Option<bool>,
    in_flight: Option<InFlightRefresh>,
    generation: u64,
}

/// Session manager.
///
/// Construct once per principal and share by `Arc`. At most one refresh is in
/// flight at any time; concurrent callers that need a refresh all await the
/// same shared future.
pub struct SessionManager {
    provider: Arc<dyn CredentialProvider>,
    pub(crate) config: SessionConfig,
    pub(crate) retry: RetryConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) classifier: FailureClassifier,
    pub(crate) messages: MessageCatalog,
    pub(crate) metrics: Arc<dyn ResilienceMetrics>,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    slot: Arc<Mutex<SessionSlot>>,
}

impl SessionManager {
    /// Create a session manager with default collaborators.
    pub fn new(provider: Arc<dyn CredentialProvider>, config: &ResilienceConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            provider,
            config: config.session.clone(),
            retry: config.retry.clone(),
            classifier: FailureClassifier::new(clock.clone()),
            clock,
            sleeper: Arc::new(TokioSleeper),
            messages: config.messages.clone(),
            metrics: Arc::new(NoOpMetrics),
            reporter: Arc::new(NoOpReporter),
            slot: Arc::new(Mutex::new(SessionSlot::default())),
        }
    }

    /// Use `clock` for expiry checks and report timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.classifier = FailureClassifier::new(clock.clone());
        self.clock = clock;
        self
    }

    /// Use `sleeper` between privileged-operation attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn ResilienceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach an error-reporting sink.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Make sure the session credential is not about to expire.
    ///
    /// Returns `refreshed: false` without touching the provider when at least
    /// `refresh_threshold` remains. Otherwise starts a refresh, or joins the
    /// one already in flight, and returns `refreshed: true` once it lands.
    pub async fn ensure_valid_session(&self) -> Result<SessionStatus, SessionError> {
        self.seed_credential().await?;

        let refresh = {
            let mut slot = self.slot.lock();
            let credential = slot.credential.as_ref().ok_or(SessionError::NoSession)?;

            let remaining = credential
                .time_until_expiry(self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            if !slot.stale && remaining >= self.config.refresh_threshold {
                return Ok(SessionStatus { refreshed: false });
            }

            let joined = slot
                .in_flight
                .as_ref()
                .map(|in_flight| (in_flight.generation, in_flight.future.clone()));

            match joined {
                Some((generation, future)) => {
                    self.metrics.record_refresh_joined();
                    tracing::debug!(generation, "joining in-flight session refresh");
                    future
                }
                None => {
                    tracing::info!(
                        remaining_secs = remaining.as_secs(),
                        stale = slot.stale,
                        "session refresh required"
                    );
                    self.start_refresh(&mut slot)
                }
            }
        };

        refresh.await.map(|_| SessionStatus { refreshed: true })
    }

    /// Ensure a valid session and verify the principal is privileged.
    ///
    /// Privilege is re-checked on every call.
    pub async fn ensure_admin_access(&self) -> Result<(), SessionError> {
        self.ensure_valid_session().await?;

        let granted = match self.provider.principal_privilege().await {
            Ok(granted) => granted,
            Err(error) => {
                self.slot.lock().privilege_verified = None;
                return Err(error);
            }
        };

        self.slot.lock().privilege_verified = Some(granted);
        self.metrics.record_privilege_check(granted);

        if granted {
            Ok(())
        } else {
            tracing::warn!("privileged operation denied for current principal");
            Err(SessionError::InsufficientPrivilege)
        }
    }

    /// Install a credential obtained elsewhere (e.g. after sign-in).
    pub fn set_credential(&self, credential: Credential) {
        let mut slot = self.slot.lock();
        slot.credential = Some(credential);
        slot.seeded = true;
        slot.stale = false;
        slot.privilege_verified = None;
    }

    /// Forget the session. A refresh still in flight is discarded on landing
    /// and its waiters receive [`SessionError::NoSession`].
    pub fn clear_session(&self) {
        let mut slot = self.slot.lock();
        slot.credential = None;
        slot.seeded = true;
        slot.stale = false;
        slot.privilege_verified = None;
        slot.in_flight = None;
        slot.generation += 1;
    }

    /// Force the next `ensure_valid_session` to refresh regardless of expiry.
    pub fn mark_stale(&self) {
        self.slot.lock().stale = true;
    }

    /// Current credential, if any.
    pub fn current_credential(&self) -> Option<Credential> {
        self.slot.lock().credential.clone()
    }

    /// Outcome of the most recent privilege check.
    pub fn privilege_verified(&self) -> Option<bool> {
        self.slot.lock().privilege_verified
    }

    /// Whether a refresh is currently in flight.
    pub fn refresh_in_flight(&self) -> bool {
        self.slot.lock().in_flight.is_some()
    }

    /// Read the provider's credential the first time the session is used.
    async fn seed_credential(&self) -> Result<(), SessionError> {
        let seeded = self.slot.lock().seeded;
        if seeded {
            return Ok(());
        }

        let loaded = self.provider.current_credential().await?;

        let mut slot = self.slot.lock();
        if !slot.seeded {
            slot.credential = loaded;
            slot.seeded = true;
        }
        Ok(())
    }

    /// Start a refresh and publish it in the slot. Caller holds the slot lock.
    fn start_refresh(&self, slot: &mut SessionSlot) -> RefreshFuture {
        slot.generation += 1;
        let generation = slot.generation;

        let provider = self.provider.clone();
        let state: Weak<Mutex<SessionSlot>> = Arc::downgrade(&self.slot);
        let metrics = self.metrics.clone();

        let future = async move {
            let result = provider.refresh_credential().await;

            // Whoever drives the shared future to completion lands the result,
            // so the marker is cleared even if the initiating caller went away.
            let landed = match state.upgrade() {
                Some(state) => {
                    let mut slot = state.lock();
                    let current = slot
                        .in_flight
                        .as_ref()
                        .map_or(false, |f| f.generation == generation);
                    if current {
                        slot.in_flight = None;
                        if let Ok(credential) = &result {
                            slot.credential = Some(credential.clone());
                            slot.stale = false;
                        }
                    }
                    current
                }
                None => false,
            };

            metrics.record_refresh(result.is_ok());
            if !landed {
                // The session was cleared while the refresh ran.
                tracing::info!(generation, "discarding refresh for cleared session");
                return Err(SessionError::NoSession);
            }
            match &result {
                Ok(credential) => tracing::info!(
                    generation,
                    expires_at = %credential.expires_at,
                    "session refreshed"
                ),
                Err(error) => tracing::warn!(generation, error = %error, "session refresh failed"),
            }
            result
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlightRefresh {
            generation,
            future: future.clone(),
        });
        future
    }
}
