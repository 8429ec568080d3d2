//! Presentation collaborator abstraction.
//!
//! Steps never draw anything themselves. They drive a `Presenter`, which
//! owns the message surface, interactive controls and the tutorial overlay.
//! Every call is fire-and-forget; the only value read back is the set of
//! click handlers captured from a control.
//!
//! Provides:
//! - `NullPresenter` for headless runs
//! - `RecordingPresenter` for tests (shared call log)
//! - `ConsolePresenter` for the interactive CLI

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Enter/exit animation played around the message surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

/// Click handlers detached from a control while a step intercepts it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedHandlers {
    pub control: String,
    pub handlers: Vec<u64>,
}

pub trait Presenter {
    /// Set the message text and show the message surface
    fn show_message(&mut self, text: &str);

    /// Hide the message surface
    fn hide_message(&mut self);

    /// Toggle the acknowledgment control next to the message
    fn set_acknowledge_visible(&mut self, visible: bool);

    fn play_transition(&mut self, transition: Transition);

    /// Enable or disable an interactive control by name
    fn set_control_enabled(&mut self, control: &str, enabled: bool);

    /// Detach and return the click handlers of a control.
    /// Returns None if no control with that name exists.
    fn capture_click_handlers(&mut self, control: &str) -> Option<CapturedHandlers>;

    /// Route clicks on `control` to the tutorial instead of the application
    fn install_click_intercept(&mut self, control: &str);

    /// Remove the intercept and put the original handlers back
    fn restore_click_handlers(&mut self, handlers: &CapturedHandlers);

    /// Invoke the application's handlers for `control`
    fn fire_click_handlers(&mut self, control: &str);

    /// Move a control into the tutorial overlay
    fn attach_to_overlay(&mut self, control: &str);

    /// Move a control back to where it came from
    fn detach_from_overlay(&mut self, control: &str);
}

/// Presenter that does nothing; every control is assumed to exist
#[derive(Debug, Default, Clone)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn show_message(&mut self, _text: &str) {}
    fn hide_message(&mut self) {}
    fn set_acknowledge_visible(&mut self, _visible: bool) {}
    fn play_transition(&mut self, _transition: Transition) {}
    fn set_control_enabled(&mut self, _control: &str, _enabled: bool) {}

    fn capture_click_handlers(&mut self, control: &str) -> Option<CapturedHandlers> {
        Some(CapturedHandlers {
            control: control.to_string(),
            handlers: Vec::new(),
        })
    }

    fn install_click_intercept(&mut self, _control: &str) {}
    fn restore_click_handlers(&mut self, _handlers: &CapturedHandlers) {}
    fn fire_click_handlers(&mut self, _control: &str) {}
    fn attach_to_overlay(&mut self, _control: &str) {}
    fn detach_from_overlay(&mut self, _control: &str) {}
}

// ─── Recording presenter ─────────────────────────────────────────────────────

/// A presenter call captured by `RecordingPresenter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    ShowMessage(String),
    HideMessage,
    SetAcknowledgeVisible(bool),
    PlayTransition(Transition),
    SetControlEnabled(String, bool),
    CaptureClickHandlers(String),
    InstallClickIntercept(String),
    RestoreClickHandlers(String),
    FireClickHandlers(String),
    AttachToOverlay(String),
    DetachFromOverlay(String),
}

/// Presenter that records every call for later inspection.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to a `Director`.
#[derive(Debug, Clone)]
pub struct RecordingPresenter {
    /// Record of calls, in order
    pub calls: Arc<Mutex<Vec<PresenterCall>>>,
    /// Controls that exist, with the handler ids attached to each
    controls: Arc<Mutex<HashMap<String, Vec<u64>>>>,
    /// Controls currently parented under the overlay
    overlay: Arc<Mutex<HashSet<String>>>,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            controls: Arc::new(Mutex::new(HashMap::new())),
            overlay: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a presenter that knows about the given controls, each with one handler
    pub fn with_controls(controls: &[&str]) -> Self {
        let presenter = Self::new();
        {
            let mut map = presenter.controls.lock().unwrap();
            for (i, name) in controls.iter().enumerate() {
                map.insert((*name).to_string(), vec![i as u64]);
            }
        }
        presenter
    }

    pub fn add_control(&self, name: &str, handlers: Vec<u64>) {
        self.controls
            .lock()
            .unwrap()
            .insert(name.to_string(), handlers);
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &PresenterCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Handlers currently attached to a control (empty while intercepted)
    pub fn handlers(&self, control: &str) -> Option<Vec<u64>> {
        self.controls.lock().unwrap().get(control).cloned()
    }

    pub fn in_overlay(&self, control: &str) -> bool {
        self.overlay.lock().unwrap().contains(control)
    }

    fn record(&self, call: PresenterCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Presenter for RecordingPresenter {
    fn show_message(&mut self, text: &str) {
        self.record(PresenterCall::ShowMessage(text.to_string()));
    }

    fn hide_message(&mut self) {
        self.record(PresenterCall::HideMessage);
    }

    fn set_acknowledge_visible(&mut self, visible: bool) {
        self.record(PresenterCall::SetAcknowledgeVisible(visible));
    }

    fn play_transition(&mut self, transition: Transition) {
        self.record(PresenterCall::PlayTransition(transition));
    }

    fn set_control_enabled(&mut self, control: &str, enabled: bool) {
        self.record(PresenterCall::SetControlEnabled(control.to_string(), enabled));
    }

    fn capture_click_handlers(&mut self, control: &str) -> Option<CapturedHandlers> {
        self.record(PresenterCall::CaptureClickHandlers(control.to_string()));
        let mut controls = self.controls.lock().unwrap();
        let handlers = controls.get_mut(control)?;
        Some(CapturedHandlers {
            control: control.to_string(),
            handlers: std::mem::take(handlers),
        })
    }

    fn install_click_intercept(&mut self, control: &str) {
        self.record(PresenterCall::InstallClickIntercept(control.to_string()));
    }

    fn restore_click_handlers(&mut self, handlers: &CapturedHandlers) {
        self.record(PresenterCall::RestoreClickHandlers(handlers.control.clone()));
        if let Some(slot) = self.controls.lock().unwrap().get_mut(&handlers.control) {
            *slot = handlers.handlers.clone();
        }
    }

    fn fire_click_handlers(&mut self, control: &str) {
        self.record(PresenterCall::FireClickHandlers(control.to_string()));
    }

    fn attach_to_overlay(&mut self, control: &str) {
        self.record(PresenterCall::AttachToOverlay(control.to_string()));
        self.overlay.lock().unwrap().insert(control.to_string());
    }

    fn detach_from_overlay(&mut self, control: &str) {
        self.record(PresenterCall::DetachFromOverlay(control.to_string()));
        self.overlay.lock().unwrap().remove(control);
    }
}

// ─── Console presenter ───────────────────────────────────────────────────────

/// Presenter used by the interactive CLI: prints to stdout.
///
/// Any control name is accepted; there is no real application behind it.
#[derive(Debug, Default, Clone)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for ConsolePresenter {
    fn show_message(&mut self, text: &str) {
        println!("  ┃ {}", text);
    }

    fn hide_message(&mut self) {
        tracing::debug!("message surface hidden");
    }

    fn set_acknowledge_visible(&mut self, visible: bool) {
        if visible {
            println!("  ┃ (type `ack` to continue)");
        }
    }

    fn play_transition(&mut self, transition: Transition) {
        tracing::trace!(?transition, "transition");
    }

    fn set_control_enabled(&mut self, control: &str, enabled: bool) {
        tracing::debug!(control, enabled, "control toggled");
    }

    fn capture_click_handlers(&mut self, control: &str) -> Option<CapturedHandlers> {
        Some(CapturedHandlers {
            control: control.to_string(),
            handlers: Vec::new(),
        })
    }

    fn install_click_intercept(&mut self, control: &str) {
        println!("  ┃ waiting for `click {}`", control);
    }

    fn restore_click_handlers(&mut self, handlers: &CapturedHandlers) {
        tracing::debug!(control = %handlers.control, "click handlers restored");
    }

    fn fire_click_handlers(&mut self, control: &str) {
        println!("  ┃ {} pressed", control);
    }

    fn attach_to_overlay(&mut self, control: &str) {
        tracing::debug!(control, "control attached to overlay");
    }

    fn detach_from_overlay(&mut self, control: &str) {
        tracing::debug!(control, "control detached from overlay");
    }
}
