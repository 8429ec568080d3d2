//! Session state machine
//!
//! Session states: READY → RUNNING → DONE (READY → DONE when terminated early)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Initialized, no step has been armed yet
    #[default]
    Ready,
    /// Steps are armed and being driven one at a time
    Running,
    /// Every step completed, or the session was terminated
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Ready => write!(f, "READY"),
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::Done => write!(f, "DONE"),
        }
    }
}

/// Errors for session state operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionStateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

impl SessionState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        match (self, target) {
            (SessionState::Ready, SessionState::Running) => true,
            // Terminated before it ever ran
            (SessionState::Ready, SessionState::Done) => true,
            (SessionState::Running, SessionState::Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Done
    }

    /// Transition in place
    pub fn transition(&mut self, target: SessionState) -> Result<(), SessionStateError> {
        if !self.can_transition_to(target) {
            return Err(SessionStateError::InvalidTransition {
                from: *self,
                to: target,
            });
        }
        *self = target;
        Ok(())
    }
}
