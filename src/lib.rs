//! Walkthrough - sequenced, step-based tutorial sessions
//!
//! A `Director` owns tutorial sessions, lets at most one of them execute a
//! step at a time and admits queued sessions in FIFO order. Steps show
//! messages, wait for clicks on a control, wait for other sessions or fire
//! registered actions; how any of that is rendered is up to a `Presenter`.

pub mod actions;
pub mod config;
pub mod definition;
pub mod director;
pub mod logging;
pub mod playback;
pub mod presenter;
pub mod session;
pub mod step;
pub mod timer;

pub use actions::ActionRegistry;
pub use definition::{DefinitionError, TutorialDefinition};
pub use director::{Director, DirectorError, SessionEvent};
pub use presenter::{NullPresenter, Presenter, RecordingPresenter};
pub use session::{Session, SessionId, SessionState};
pub use step::{Step, StepKind, StepKindTag, StepState};
