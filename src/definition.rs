//! Tutorial definitions: the static, configuration-time description of
//! sessions and their steps.
//!
//! Definitions are TOML (or JSON) documents:
//!
//! ```toml
//! [[session]]
//! name = "intro"
//! auto_advance = true
//! queue_on_load = true
//!
//! [[session.step]]
//! kind = "message"
//! message = "Welcome!"
//!
//! [[session.step]]
//! kind = "button"
//! control = "inventory"
//! delay_ms = 250
//! ```
//!
//! Everything that can be checked before a session runs is checked here:
//! malformed steps and unknown actions are rejected at load time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::ActionRegistry;
use crate::director::{Director, DirectorError};
use crate::session::{Session, SessionId};
use crate::step::Step;

/// Errors found while loading or validating a definition
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate session name '{0}'")]
    DuplicateSession(String),

    #[error("session {session}, step {step}: '{field}' must not be blank")]
    BlankField {
        session: String,
        step: usize,
        field: &'static str,
    },

    #[error("session {session}, step {step}: waits on its own session")]
    SelfWait { session: String, step: usize },

    #[error("session {session}, step {step}: unknown action '{action}'")]
    UnknownAction {
        session: String,
        step: usize,
        action: String,
    },

    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// A whole definition file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TutorialDefinition {
    #[serde(default, rename = "session")]
    pub sessions: Vec<SessionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
    #[serde(default)]
    pub start_delay_ms: u64,
    /// Queue the session as soon as it is installed
    #[serde(default)]
    pub queue_on_load: bool,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepDef>,
}

fn default_auto_advance() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    #[serde(flatten)]
    pub kind: StepKindDef,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKindDef {
    Generic,
    Message,
    Button {
        control: String,
    },
    WaitForSession {
        target: String,
        #[serde(default)]
        run_target: bool,
    },
    Action {
        action: String,
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl SessionDef {
    /// Human-readable label for error messages
    fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("#{}", index))
    }
}

impl TutorialDefinition {
    pub fn from_toml_str(contents: &str) -> Result<Self, DefinitionError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Load a definition file; `.json` files are parsed as JSON, anything else as TOML
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let contents = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    /// Validate and build runtime sessions, resolving actions against `actions`
    pub fn build(&self, actions: &ActionRegistry) -> Result<Vec<Session>, DefinitionError> {
        let mut seen = HashSet::new();
        for def in &self.sessions {
            if let Some(name) = &def.name {
                if !seen.insert(name.as_str()) {
                    return Err(DefinitionError::DuplicateSession(name.clone()));
                }
            }
        }

        self.sessions
            .iter()
            .enumerate()
            .map(|(i, def)| self.build_session(i, def, actions))
            .collect()
    }

    fn build_session(
        &self,
        index: usize,
        def: &SessionDef,
        actions: &ActionRegistry,
    ) -> Result<Session, DefinitionError> {
        let label = def.label(index);
        let steps = def
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| self.build_step(&label, def, i, step, actions))
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = Session::new(steps)
            .with_auto_advance(def.auto_advance)
            .with_start_delay(Duration::from_millis(def.start_delay_ms));
        if let Some(name) = &def.name {
            session = session.with_name(name.clone());
        }
        Ok(session)
    }

    fn build_step(
        &self,
        label: &str,
        session: &SessionDef,
        index: usize,
        def: &StepDef,
        actions: &ActionRegistry,
    ) -> Result<Step, DefinitionError> {
        let blank = |field: &'static str| DefinitionError::BlankField {
            session: label.to_string(),
            step: index,
            field,
        };

        let step = match &def.kind {
            StepKindDef::Generic => Step::generic(),
            StepKindDef::Message => match def.message.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(text) => Step::message(text),
                None => Step::empty_message(),
            },
            StepKindDef::Button { control } => {
                if control.trim().is_empty() {
                    return Err(blank("control"));
                }
                Step::button(control.clone())
            }
            StepKindDef::WaitForSession { target, run_target } => {
                if target.trim().is_empty() {
                    return Err(blank("target"));
                }
                if session.name.as_deref() == Some(target.as_str()) {
                    return Err(DefinitionError::SelfWait {
                        session: label.to_string(),
                        step: index,
                    });
                }
                let known = self
                    .sessions
                    .iter()
                    .any(|s| s.name.as_deref().is_some_and(|n| n.contains(target.as_str())));
                if !known {
                    tracing::warn!(
                        session = label,
                        step = index,
                        target = %target,
                        "wait target is not defined in this file"
                    );
                }
                Step::wait_for_session(target.clone(), *run_target)
            }
            StepKindDef::Action {
                action,
                targets,
                args,
            } => {
                if action.trim().is_empty() {
                    return Err(blank("action"));
                }
                let key = actions.resolve(action, targets).ok_or_else(|| {
                    DefinitionError::UnknownAction {
                        session: label.to_string(),
                        step: index,
                        action: action.clone(),
                    }
                })?;
                Step::action(key, args.clone())
            }
        };

        let mut step = step.with_delay(Duration::from_millis(def.delay_ms));
        if !matches!(def.kind, StepKindDef::Message) {
            if let Some(text) = &def.message {
                step = step.with_message(text.clone());
            }
        }
        Ok(step)
    }

    /// Build every session, hand them to `director`, initialize them and
    /// queue the ones marked `queue_on_load` (in file order)
    pub fn install(&self, director: &mut Director) -> Result<Vec<SessionId>, DefinitionError> {
        let sessions = self.build(director.actions())?;
        let ids: Vec<SessionId> = sessions
            .into_iter()
            .map(|session| director.add_session(session))
            .collect();

        for id in &ids {
            director.init(*id)?;
        }
        for (def, id) in self.sessions.iter().zip(&ids) {
            if def.queue_on_load {
                director.queue(*id)?;
            }
        }
        tracing::info!(sessions = ids.len(), "definition installed");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepKind, StepKindTag};

    const SAMPLE: &str = r#"
[[session]]
name = "intro"
queue_on_load = true

[[session.step]]
kind = "message"
message = "Welcome"

[[session.step]]
kind = "button"
control = "inventory"
delay_ms = 250

[[session.step]]
kind = "wait_for_session"
target = "inventory-tour"
run_target = true

[[session.step]]
kind = "action"
action = "open"
targets = ["hud"]
args = ["map"]

[[session]]
name = "inventory-tour"
auto_advance = false
start_delay_ms = 500

[[session.step]]
kind = "generic"
message = "This is your inventory"
"#;

    fn registry() -> ActionRegistry {
        let mut actions = ActionRegistry::new();
        actions.register("hud.open", |_| {});
        actions
    }

    #[test]
    fn test_parse_and_build() {
        let def = TutorialDefinition::from_toml_str(SAMPLE).unwrap();
        assert_eq!(def.sessions.len(), 2);

        let sessions = def.build(&registry()).unwrap();
        let intro = &sessions[0];
        assert_eq!(intro.name(), Some("intro"));
        assert_eq!(intro.total_steps(), 4);
        assert_eq!(intro.step(0).unwrap().tag(), StepKindTag::Message);
        assert_eq!(intro.step(1).unwrap().delay(), Duration::from_millis(250));
        assert_eq!(
            intro.step(3).unwrap().kind(),
            &StepKind::Action {
                action: "hud.open".to_string(),
                args: vec!["map".to_string()]
            }
        );

        let tour = &sessions[1];
        assert!(!tour.auto_advance());
        assert_eq!(tour.start_delay(), Duration::from_millis(500));
        assert_eq!(tour.step(0).unwrap().message_text(), Some("This is your inventory"));
    }

    #[test]
    fn test_unknown_action_fails_fast() {
        let def = TutorialDefinition::from_toml_str(SAMPLE).unwrap();
        let err = def.build(&ActionRegistry::new()).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownAction { ref action, step: 3, .. } if action == "open"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let def = TutorialDefinition::from_toml_str(
            "[[session]]\nname = \"a\"\n\n[[session]]\nname = \"a\"\n",
        )
        .unwrap();
        assert!(matches!(
            def.build(&ActionRegistry::new()),
            Err(DefinitionError::DuplicateSession(name)) if name == "a"
        ));
    }

    #[test]
    fn test_blank_control_rejected() {
        let def = TutorialDefinition::from_toml_str(
            "[[session]]\n[[session.step]]\nkind = \"button\"\ncontrol = \" \"\n",
        )
        .unwrap();
        assert!(matches!(
            def.build(&ActionRegistry::new()),
            Err(DefinitionError::BlankField { field: "control", step: 0, .. })
        ));
    }

    #[test]
    fn test_self_wait_rejected() {
        let def = TutorialDefinition::from_toml_str(
            "[[session]]\nname = \"loop\"\n[[session.step]]\nkind = \"wait_for_session\"\ntarget = \"loop\"\n",
        )
        .unwrap();
        assert!(matches!(
            def.build(&ActionRegistry::new()),
            Err(DefinitionError::SelfWait { step: 0, .. })
        ));
    }

    #[test]
    fn test_message_without_text_completes_immediately() {
        let def = TutorialDefinition::from_toml_str(
            "[[session]]\nname = \"quiet\"\n[[session.step]]\nkind = \"message\"\n\n[[session.step]]\nkind = \"message\"\nmessage = \"  \"\n",
        )
        .unwrap();
        let mut director = Director::new(crate::presenter::NullPresenter);
        let ids = def.install(&mut director).unwrap();

        let session = director.session(ids[0]).unwrap();
        assert_eq!(session.step(0).unwrap().tag(), StepKindTag::Message);
        assert_eq!(session.step(1).unwrap().message_text(), None);

        director.run(ids[0]).unwrap();
        assert_eq!(
            director.session(ids[0]).unwrap().state(),
            crate::session::SessionState::Done
        );
    }

    #[test]
    fn test_empty_sessions_allowed() {
        let def = TutorialDefinition::from_toml_str("[[session]]\nname = \"empty\"\n").unwrap();
        let sessions = def.build(&ActionRegistry::new()).unwrap();
        assert_eq!(sessions[0].total_steps(), 0);
    }

    #[test]
    fn test_json_definition() {
        let json = r#"{"session": [{"name": "j", "step": [{"kind": "generic"}]}]}"#;
        let def = TutorialDefinition::from_json_str(json).unwrap();
        assert_eq!(def.sessions[0].steps[0].kind, StepKindDef::Generic);
        assert!(def.sessions[0].auto_advance);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = TutorialDefinition::load(Path::new("/nonexistent/tour.toml")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io { .. }));
    }
}
