//! Clock and Sleeper
//!
//! Time sources injected into classification, session expiry checks and retry
//! backoff so all three can be driven deterministically in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Wall-clock time source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for testing.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Advance the clock.
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Cooperative sleep used between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create new recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Sum of requested delays.
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
