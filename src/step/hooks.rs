//! Variant hooks: what each kind of step does to the outside world.

use super::{Step, StepKind};
use crate::actions::ActionRegistry;
use crate::presenter::{Presenter, Transition};

/// What the work phase left the step waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    /// Work is done; complete now
    Complete,
    /// Waiting for an external signal (acknowledgment or click)
    Wait,
    /// Waiting for the named session to finish
    WaitForSession { target: String, run_target: bool },
}

/// Downstream effect released by `invoke_events` that the director must carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    QueueSession(String),
}

impl Step {
    /// Seize external resources before any step of the session executes
    pub(crate) fn pre_execute(&mut self, presenter: &mut dyn Presenter) {
        if let StepKind::ButtonWait {
            control, locked, ..
        } = &mut self.kind
        {
            presenter.set_control_enabled(control, false);
            *locked = true;
        }
    }

    /// The work phase, run once the step's delay has elapsed
    pub(crate) fn render(&mut self, presenter: &mut dyn Presenter) -> Work {
        match &mut self.kind {
            StepKind::Generic => {
                if let Some(text) = &self.message {
                    presenter.show_message(text);
                    self.message_shown = true;
                }
                Work::Complete
            }
            StepKind::Message => match &self.message {
                Some(text) => {
                    presenter.show_message(text);
                    presenter.play_transition(Transition::Enter);
                    presenter.set_acknowledge_visible(true);
                    self.message_shown = true;
                    Work::Wait
                }
                None => Work::Complete,
            },
            StepKind::ButtonWait {
                control,
                intercept,
                locked,
            } => match presenter.capture_click_handlers(control) {
                Some(handlers) => {
                    presenter.install_click_intercept(control);
                    presenter.attach_to_overlay(control);
                    presenter.set_control_enabled(control, true);
                    *intercept = Some(handlers);
                    *locked = false;
                    Work::Wait
                }
                None => {
                    tracing::warn!(control = %control, "control not found, not waiting for it");
                    Work::Complete
                }
            },
            StepKind::WaitForSession { target, run_target } => Work::WaitForSession {
                target: target.clone(),
                run_target: *run_target,
            },
            StepKind::Action { .. } => Work::Complete,
        }
    }

    /// Completion side effects: tear down presentation, release intercepts,
    /// perform actions
    pub(crate) fn on_complete(&mut self, presenter: &mut dyn Presenter, actions: &mut ActionRegistry) {
        match &mut self.kind {
            StepKind::Message if self.message_shown => {
                presenter.set_acknowledge_visible(false);
                presenter.play_transition(Transition::Exit);
                presenter.hide_message();
                self.message_shown = false;
            }
            StepKind::Generic if self.message_shown => {
                presenter.hide_message();
                self.message_shown = false;
            }
            StepKind::ButtonWait {
                control,
                intercept,
                locked,
            } => {
                if let Some(handlers) = intercept.take() {
                    presenter.restore_click_handlers(&handlers);
                    presenter.fire_click_handlers(control);
                    presenter.detach_from_overlay(control);
                }
                if *locked {
                    presenter.set_control_enabled(control, true);
                    *locked = false;
                }
            }
            StepKind::Action { action, args } => {
                actions.invoke(action, args);
            }
            _ => {}
        }
    }

    /// Undo every external mutation this step made, without firing anything
    pub(crate) fn restore(&mut self, presenter: &mut dyn Presenter) {
        if self.message_shown {
            if self.kind == StepKind::Message {
                presenter.set_acknowledge_visible(false);
            }
            presenter.hide_message();
            self.message_shown = false;
        }
        if let StepKind::ButtonWait {
            control,
            intercept,
            locked,
        } = &mut self.kind
        {
            if let Some(handlers) = intercept.take() {
                presenter.restore_click_handlers(&handlers);
                presenter.detach_from_overlay(control);
            }
            if *locked {
                presenter.set_control_enabled(control, true);
                *locked = false;
            }
        }
    }

    /// Fire whatever callback this step was holding back
    pub(crate) fn invoke_events(
        &mut self,
        presenter: &mut dyn Presenter,
        actions: &mut ActionRegistry,
    ) -> Option<Deferred> {
        match &self.kind {
            StepKind::ButtonWait { control, .. } => {
                presenter.fire_click_handlers(control);
                None
            }
            StepKind::WaitForSession { target, .. } => Some(Deferred::QueueSession(target.clone())),
            StepKind::Action { action, args } => {
                actions.invoke(action, args);
                None
            }
            StepKind::Generic | StepKind::Message => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{PresenterCall, RecordingPresenter};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_message_waits_then_tears_down() {
        let presenter = RecordingPresenter::new();
        let mut handle = presenter.clone();
        let mut actions = ActionRegistry::new();

        let mut step = Step::message("Welcome");
        step.begin();
        assert_eq!(step.render(&mut handle), Work::Wait);
        assert_eq!(
            presenter.calls(),
            vec![
                PresenterCall::ShowMessage("Welcome".to_string()),
                PresenterCall::PlayTransition(Transition::Enter),
                PresenterCall::SetAcknowledgeVisible(true),
            ]
        );

        presenter.clear();
        step.on_complete(&mut handle, &mut actions);
        assert_eq!(
            presenter.calls(),
            vec![
                PresenterCall::SetAcknowledgeVisible(false),
                PresenterCall::PlayTransition(Transition::Exit),
                PresenterCall::HideMessage,
            ]
        );
    }

    #[test]
    fn test_generic_message_hidden_on_complete() {
        let presenter = RecordingPresenter::new();
        let mut handle = presenter.clone();
        let mut actions = ActionRegistry::new();

        let mut step = Step::generic().with_message("Look here");
        step.begin();
        assert_eq!(step.render(&mut handle), Work::Complete);
        step.on_complete(&mut handle, &mut actions);

        assert_eq!(
            presenter.calls(),
            vec![
                PresenterCall::ShowMessage("Look here".to_string()),
                PresenterCall::HideMessage,
            ]
        );

        // Nothing left for a later restore to undo
        presenter.clear();
        step.restore(&mut handle);
        assert!(presenter.calls().is_empty());
    }

    #[test]
    fn test_message_without_text_completes() {
        let mut presenter = RecordingPresenter::new();
        let mut step = Step::with_kind(StepKind::Message);
        assert_eq!(step.render(&mut presenter), Work::Complete);
        assert!(presenter.calls().is_empty());
    }

    #[test]
    fn test_button_intercepts_and_releases() {
        let presenter = RecordingPresenter::with_controls(&["inventory"]);
        let mut handle = presenter.clone();
        let mut actions = ActionRegistry::new();

        let mut step = Step::button("inventory");
        step.pre_execute(&mut handle);
        assert_eq!(
            presenter.count(&PresenterCall::SetControlEnabled("inventory".to_string(), false)),
            1
        );

        step.begin();
        assert_eq!(step.render(&mut handle), Work::Wait);
        assert_eq!(step.intercepted_control(), Some("inventory"));
        assert!(presenter.in_overlay("inventory"));
        assert_eq!(presenter.handlers("inventory"), Some(vec![]));

        step.on_complete(&mut handle, &mut actions);
        assert_eq!(step.intercepted_control(), None);
        assert!(!presenter.in_overlay("inventory"));
        assert_eq!(presenter.handlers("inventory"), Some(vec![0]));
        assert_eq!(
            presenter.count(&PresenterCall::FireClickHandlers("inventory".to_string())),
            1
        );
    }

    #[test]
    fn test_button_missing_control_completes() {
        let mut presenter = RecordingPresenter::new();
        let mut step = Step::button("nowhere");
        assert_eq!(step.render(&mut presenter), Work::Complete);
        assert_eq!(step.intercepted_control(), None);
    }

    #[test]
    fn test_button_restore_does_not_fire() {
        let presenter = RecordingPresenter::with_controls(&["map"]);
        let mut handle = presenter.clone();

        let mut step = Step::button("map");
        step.pre_execute(&mut handle);
        step.begin();
        step.render(&mut handle);
        step.restore(&mut handle);

        assert_eq!(presenter.handlers("map"), Some(vec![0]));
        assert!(!presenter.in_overlay("map"));
        assert_eq!(presenter.count(&PresenterCall::FireClickHandlers("map".to_string())), 0);
    }

    #[test]
    fn test_restore_unlocks_pre_executed_button() {
        let presenter = RecordingPresenter::with_controls(&["map"]);
        let mut handle = presenter.clone();

        let mut step = Step::button("map");
        step.pre_execute(&mut handle);
        step.restore(&mut handle);

        assert_eq!(
            presenter.count(&PresenterCall::SetControlEnabled("map".to_string(), true)),
            1
        );
    }

    #[test]
    fn test_action_runs_on_complete_and_invoke_events() {
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let mut actions = ActionRegistry::new();
        actions.register("tick", move |_| counter.set(counter.get() + 1));

        let mut presenter = RecordingPresenter::new();
        let mut step = Step::action("tick", vec![]);

        assert_eq!(step.render(&mut presenter), Work::Complete);
        step.on_complete(&mut presenter, &mut actions);
        assert_eq!(step.invoke_events(&mut presenter, &mut actions), None);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_wait_for_session_defers_queueing_target() {
        let mut presenter = RecordingPresenter::new();
        let mut actions = ActionRegistry::new();
        let mut step = Step::wait_for_session("inventory", true);

        assert_eq!(
            step.render(&mut presenter),
            Work::WaitForSession {
                target: "inventory".to_string(),
                run_target: true
            }
        );
        assert_eq!(
            step.invoke_events(&mut presenter, &mut actions),
            Some(Deferred::QueueSession("inventory".to_string()))
        );
    }
}
