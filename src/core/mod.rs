//! Core
//!
//! Core infrastructure (clock and sleeper, credential provider, failure
//! classification, user-facing messages).

pub mod classifier;
pub mod clock;
pub mod messages;
pub mod provider;

pub use classifier::{classify_kind, ClassificationContext, FailureClassifier};
pub use clock::{Clock, InstantSleeper, MockClock, RecordingSleeper, Sleeper, SystemClock, TokioSleeper};
pub use messages::{MessageCatalog, MessageTemplate};
pub use provider::{create_mock_credential_provider, CredentialProvider, MockCredentialProvider};
