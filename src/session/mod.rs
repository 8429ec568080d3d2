//! Sessions: an ordered run of steps driven one at a time.
//!
//! A `Session` holds its steps, the current index and the coarse
//! READY/RUNNING/DONE state. Driving it (running steps, reacting to
//! completion, talking to other sessions) is the director's job; this
//! module only exposes the queries and the index bookkeeping.

mod state;

pub use state::{SessionState, SessionStateError};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Identifier handed out by a `Director` when a session is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// An ordered sequence of steps with its own lifecycle
#[derive(Debug, Clone)]
pub struct Session {
    name: Option<String>,
    steps: Vec<Step>,
    current: usize,
    state: SessionState,
    auto_advance: bool,
    start_delay: Duration,
    initialized: bool,
}

impl Session {
    /// Create a session over `steps`. Auto-advance is on by default.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            name: None,
            steps,
            current: 0,
            state: SessionState::Ready,
            auto_advance: true,
            start_delay: Duration::ZERO,
            initialized: false,
        }
    }

    pub fn named(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self::new(steps).with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    pub fn current_step_index(&self) -> usize {
        self.current
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// The step at the current index, or None once past the end
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current)
    }

    /// True on the last step, past it, or when there are no steps at all
    pub fn is_last_step(&self) -> bool {
        self.current + 1 >= self.steps.len()
    }

    /// True iff the current step is executing. A finished session never is.
    pub fn is_executing(&self) -> bool {
        !self.is_finished() && self.current_step().is_some_and(Step::is_executing)
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Done
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Name contains `query` (substring match)
    pub fn matches_name(&self, query: &str) -> bool {
        self.name.as_deref().is_some_and(|n| n.contains(query))
    }

    // ─── Bookkeeping used by the director ────────────────────────────────────

    pub(crate) fn mark_initialized(&mut self) -> bool {
        !std::mem::replace(&mut self.initialized, true)
    }

    pub(crate) fn transition(&mut self, target: SessionState) -> Result<(), SessionStateError> {
        self.state.transition(target)
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    pub(crate) fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.current)
    }

    /// Steps from the current index to the end
    pub(crate) fn remaining_steps_mut(&mut self) -> &mut [Step] {
        let start = self.current.min(self.steps.len());
        &mut self.steps[start..]
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    /// Move past the current step. Returns true if that was the last one.
    pub(crate) fn advance(&mut self) -> bool {
        if self.current < self.steps.len() {
            self.current += 1;
        }
        self.current >= self.steps.len()
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.current = index;
    }

    /// Index of the last step (0 for an empty session)
    pub(crate) fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}
