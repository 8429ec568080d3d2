//! Steps: the unit of sequenced tutorial work.
//!
//! Step lifecycle: NOT_STARTED → EXECUTING → COMPLETE
//!
//! `init` is the only way back to NOT_STARTED. The variant-specific hooks
//! live in `hooks`; this module holds the data model and the guarded state
//! transitions shared by every variant.

mod hooks;

pub use hooks::{Deferred, Work};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::presenter::CapturedHandlers;

/// Step state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Armed, not yet executed
    #[default]
    NotStarted,
    /// Executing: waiting on a delay, an interaction, or another session
    Executing,
    /// Done; never executes again until `init`
    Complete,
}

/// Variant discriminant, used to query what kind of step is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKindTag {
    Generic,
    Message,
    ButtonWait,
    WaitForSession,
    Action,
}

impl fmt::Display for StepKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKindTag::Generic => "generic",
            StepKindTag::Message => "message",
            StepKindTag::ButtonWait => "button",
            StepKindTag::WaitForSession => "wait_for_session",
            StepKindTag::Action => "action",
        };
        f.write_str(name)
    }
}

/// Closed set of step behaviours, with each variant's runtime state
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Shows its message (if any) and completes on its own
    Generic,
    /// Shows its message and waits for acknowledgment
    Message,
    /// Intercepts a control and waits for it to be clicked
    ButtonWait {
        control: String,
        /// Handlers detached from the control while intercepted
        intercept: Option<CapturedHandlers>,
        /// Control was disabled by `pre_execute`
        locked: bool,
    },
    /// Waits for another session (found by name) to finish
    WaitForSession { target: String, run_target: bool },
    /// Performs a registered action on completion
    Action { action: String, args: Vec<String> },
}

impl StepKind {
    pub fn tag(&self) -> StepKindTag {
        match self {
            StepKind::Generic => StepKindTag::Generic,
            StepKind::Message => StepKindTag::Message,
            StepKind::ButtonWait { .. } => StepKindTag::ButtonWait,
            StepKind::WaitForSession { .. } => StepKindTag::WaitForSession,
            StepKind::Action { .. } => StepKindTag::Action,
        }
    }
}

/// A single step of a session
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    kind: StepKind,
    state: StepState,
    delay: Duration,
    message: Option<String>,
    /// This step put its message on the surface and has not hidden it yet
    message_shown: bool,
}

impl Step {
    fn with_kind(kind: StepKind) -> Self {
        Self {
            kind,
            state: StepState::NotStarted,
            delay: Duration::ZERO,
            message: None,
            message_shown: false,
        }
    }

    /// A step that completes as soon as it runs
    pub fn generic() -> Self {
        Self::with_kind(StepKind::Generic)
    }

    /// A step that shows `text` and waits for acknowledgment
    pub fn message(text: impl Into<String>) -> Self {
        Self::with_kind(StepKind::Message).with_message(text)
    }

    /// A message step with nothing to show; it completes as soon as it runs
    pub fn empty_message() -> Self {
        Self::with_kind(StepKind::Message)
    }

    /// A step that waits for `control` to be clicked
    pub fn button(control: impl Into<String>) -> Self {
        Self::with_kind(StepKind::ButtonWait {
            control: control.into(),
            intercept: None,
            locked: false,
        })
    }

    /// A step that waits for the session whose name contains `target` to finish
    pub fn wait_for_session(target: impl Into<String>, run_target: bool) -> Self {
        Self::with_kind(StepKind::WaitForSession {
            target: target.into(),
            run_target,
        })
    }

    /// A step that invokes the registered action `action` when it completes
    pub fn action(action: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_kind(StepKind::Action {
            action: action.into(),
            args,
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn tag(&self) -> StepKindTag {
        self.kind.tag()
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn message_text(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == StepState::Complete
    }

    pub fn is_executing(&self) -> bool {
        self.state == StepState::Executing
    }

    /// True iff the step has neither started nor finished
    pub fn can_execute(&self) -> bool {
        !self.is_complete() && !self.is_executing()
    }

    /// Message step showing its message and waiting for acknowledgment
    pub fn is_awaiting_acknowledgment(&self) -> bool {
        self.is_executing() && self.kind == StepKind::Message && self.message_shown
    }

    /// Control intercepted by this step, if it is a button step with an active intercept
    pub fn intercepted_control(&self) -> Option<&str> {
        match &self.kind {
            StepKind::ButtonWait {
                control,
                intercept: Some(_),
                ..
            } => Some(control),
            _ => None,
        }
    }

    /// Reset transient state so the step can run again
    pub fn init(&mut self) {
        self.state = StepState::NotStarted;
        self.message_shown = false;
        if let StepKind::ButtonWait {
            intercept, locked, ..
        } = &mut self.kind
        {
            *intercept = None;
            *locked = false;
        }
    }

    /// Enter EXECUTING. Returns false (and does nothing) if the step is
    /// already executing or complete.
    pub(crate) fn begin(&mut self) -> bool {
        if !self.can_execute() {
            return false;
        }
        self.state = StepState::Executing;
        true
    }

    /// EXECUTING → COMPLETE. Returns false if the step was not executing,
    /// so a second completion signal is absorbed.
    pub(crate) fn finish(&mut self) -> bool {
        if self.state != StepState::Executing {
            return false;
        }
        self.state = StepState::Complete;
        true
    }

    /// Mark complete from any state without running completion effects.
    /// Returns false if the step was already complete.
    pub(crate) fn force_complete(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.state = StepState::Complete;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_resets_flags_from_any_state() {
        let mut step = Step::generic();
        assert!(step.begin());
        assert!(step.finish());
        assert!(step.is_complete());

        step.init();
        assert!(!step.is_complete());
        assert!(!step.is_executing());

        step.begin();
        step.init();
        assert_eq!(step.state(), StepState::NotStarted);
    }

    #[test]
    fn test_begin_is_reentrancy_guarded() {
        let mut step = Step::message("hi");
        assert!(step.can_execute());
        assert!(step.begin());
        assert!(!step.can_execute());
        assert!(!step.begin());
        assert!(step.is_executing());
    }

    #[test]
    fn test_finish_only_once() {
        let mut step = Step::generic();
        assert!(!step.finish(), "cannot finish before executing");

        step.begin();
        assert!(step.finish());
        assert!(!step.finish());
        assert!(!step.begin(), "complete step never re-executes");
    }

    #[test]
    fn test_force_complete() {
        let mut step = Step::button("ok");
        assert!(step.force_complete());
        assert!(!step.force_complete());
        assert!(step.is_complete());
    }

    #[test]
    fn test_tags() {
        assert_eq!(Step::generic().tag(), StepKindTag::Generic);
        assert_eq!(Step::message("m").tag(), StepKindTag::Message);
        assert_eq!(Step::button("b").tag(), StepKindTag::ButtonWait);
        assert_eq!(
            Step::wait_for_session("s", false).tag(),
            StepKindTag::WaitForSession
        );
        assert_eq!(Step::action("a", vec![]).tag(), StepKindTag::Action);
        assert_eq!(StepKindTag::ButtonWait.to_string(), "button");
    }
}
