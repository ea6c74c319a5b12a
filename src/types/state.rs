//! Operation State
//!
//! Per-operation lifecycle as driven by the runner.

use serde::Serialize;

/// Lifecycle state of a single logical operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Initial,
    Running,
    Succeeded,
    FailedTerminal,
    FailedRecoverable,
    Retrying,
    Exhausted,
}

impl OperationState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal | Self::Exhausted)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Initial, Running)
                | (Running, Succeeded)
                | (Running, FailedTerminal)
                | (Running, FailedRecoverable)
                | (FailedRecoverable, Retrying)
                | (FailedRecoverable, FailedTerminal)
                | (FailedRecoverable, Exhausted)
                | (Retrying, Running)
        )
    }
}
