//! Interactive playback of a tutorial definition.
//!
//! Reads commands from stdin, forwards them to the director as signals and
//! drives the director's clock from a tokio interval.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PlaybackConfig;
use crate::director::{Director, DirectorError, SessionEvent};
use crate::session::{SessionId, SessionState};

/// A single line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Acknowledge the message shown by a session (the executing one if omitted)
    Ack(Option<String>),
    /// Click a control
    Click(String),
    Skip(Option<String>),
    Terminate { session: String, invoke: bool },
    Run(String),
    Queue(String),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Empty);
        };
        let rest: Vec<&str> = words.collect();
        let optional = |rest: &[&str]| rest.first().map(|s| (*s).to_string());
        let required = |name: &'static str, rest: &[&str]| {
            rest.first()
                .map(|s| (*s).to_string())
                .ok_or(CommandError::MissingArgument(name))
        };

        let command = match verb {
            "ack" | "a" => Command::Ack(optional(&rest)),
            "click" | "c" => Command::Click(required("click", &rest)?),
            "skip" | "s" => Command::Skip(optional(&rest)),
            "terminate" | "t" => {
                let mut invoke = false;
                let mut session = None;
                for word in &rest {
                    match *word {
                        "--invoke" => invoke = true,
                        other if session.is_none() => session = Some(other.to_string()),
                        other => return Err(CommandError::UnexpectedArgument(other.to_string())),
                    }
                }
                Command::Terminate {
                    session: session.ok_or(CommandError::MissingArgument("terminate"))?,
                    invoke,
                }
            }
            "run" => Command::Run(required("run", &rest)?),
            "queue" | "q" => Command::Queue(required("queue", &rest)?),
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no session matches '{0}'")]
    NoSuchSession(String),

    #[error("no session is registered")]
    NothingRegistered,

    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// What the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

const HELP: &str = "\
commands:
  ack [session]                  acknowledge the shown message
  click <control>                click a control
  skip [session]                 skip the current step
  terminate <session> [--invoke] end a session early
  run <session>                  run a session now, ignoring the queue
  queue <session>                queue a session
  status                         list sessions
  quit                           stop playback";

pub struct Playback {
    director: Director,
    tick: Duration,
}

impl Playback {
    pub fn new(director: Director, config: &PlaybackConfig) -> Self {
        Self {
            director,
            tick: Duration::from_millis(config.tick_ms.max(1)),
        }
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    /// Nothing is running, queued or scheduled. A running session with no
    /// step to run (an empty one) does not count.
    pub fn is_idle(&self) -> bool {
        self.director.queued().next().is_none()
            && !self.director.has_pending_timers()
            && !self
                .director
                .sessions()
                .any(|(_, s)| s.state() == SessionState::Running && s.current_step().is_some())
    }

    /// Registered sessions first, then any session the director owns
    fn resolve(&self, query: &str) -> Result<SessionId, PlaybackError> {
        self.director
            .find_by_name(query)
            .or_else(|| {
                self.director
                    .sessions()
                    .find(|(_, s)| s.matches_name(query))
                    .map(|(id, _)| id)
            })
            .ok_or_else(|| PlaybackError::NoSuchSession(query.to_string()))
    }

    fn resolve_or_first(&self, query: Option<&str>) -> Result<SessionId, PlaybackError> {
        match query {
            Some(query) => self.resolve(query),
            None => {
                let registered = self.director.registered();
                registered
                    .iter()
                    .copied()
                    .find(|id| self.director.session(*id).is_some_and(|s| s.is_executing()))
                    .or_else(|| registered.first().copied())
                    .ok_or(PlaybackError::NothingRegistered)
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<Flow, PlaybackError> {
        tracing::debug!(?command, "playback command");
        match command {
            Command::Ack(query) => {
                let id = self.resolve_or_first(query.as_deref())?;
                if !self.director.acknowledge(id)? {
                    println!("{} is not waiting for acknowledgment", id);
                }
            }
            Command::Click(control) => {
                if !self.director.click(&control) {
                    println!("nothing is waiting for `{}`", control);
                }
            }
            Command::Skip(query) => {
                let id = self.resolve_or_first(query.as_deref())?;
                self.director.skip(id)?;
            }
            Command::Terminate { session, invoke } => {
                let id = self.resolve(&session)?;
                self.director.terminate(id, invoke)?;
            }
            Command::Run(session) => {
                let id = self.resolve(&session)?;
                self.director.run(id)?;
            }
            Command::Queue(session) => {
                let id = self.resolve(&session)?;
                self.director.queue(id)?;
            }
            Command::Status => {
                for line in self.status_lines() {
                    println!("{}", line);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn status_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .director
            .sessions()
            .map(|(id, s)| {
                let position = if s.total_steps() == 0 {
                    "no steps".to_string()
                } else {
                    format!(
                        "step {}/{}",
                        (s.current_step_index() + 1).min(s.total_steps()),
                        s.total_steps()
                    )
                };
                format!(
                    "{} {:<20} {:<8} {}{}",
                    id,
                    s.name().unwrap_or("<unnamed>"),
                    s.state(),
                    position,
                    if s.is_executing() { " *" } else { "" }
                )
            })
            .collect();

        let queued: Vec<String> = self.director.queued().map(|id| id.to_string()).collect();
        if !queued.is_empty() {
            lines.push(format!("queued: {}", queued.join(", ")));
        }
        lines
    }

    fn describe(&self, event: &SessionEvent) -> String {
        let id = event.session();
        let name = self
            .director
            .session(id)
            .and_then(|s| s.name())
            .unwrap_or("<unnamed>")
            .to_string();
        match event {
            SessionEvent::Started { .. } => format!("▶ {} started", name),
            SessionEvent::StepCompleted {
                step: Some(index), ..
            } => format!("  {} finished step {}", name, index + 1),
            SessionEvent::StepCompleted { step: None, .. } => {
                format!("  {} skipped a step", name)
            }
            SessionEvent::Completed { .. } => format!("✓ {} completed", name),
            SessionEvent::Terminated { .. } => format!("✗ {} terminated", name),
        }
    }

    fn report_events(&mut self) {
        for event in self.director.drain_events() {
            println!("{}", self.describe(&event));
        }
    }

    /// Run until every session has finished, stdin closes or `quit` is typed
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        println!("type `help` for commands");
        self.report_events();

        loop {
            if self.is_idle() {
                println!("all queued sessions finished");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    self.director.advance(now - last);
                    last = now;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::debug!("stdin closed");
                        break;
                    };
                    match line.parse::<Command>() {
                        Ok(command) => match self.apply(command) {
                            Ok(Flow::Quit) => break,
                            Ok(Flow::Continue) => {}
                            Err(e) => println!("error: {}", e),
                        },
                        Err(CommandError::Empty) => {}
                        Err(e) => println!("{}", e),
                    }
                }
            }

            self.report_events();
        }

        self.report_events();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::NullPresenter;
    use crate::session::Session;
    use crate::step::Step;

    #[test]
    fn test_parse_commands() {
        assert_eq!("ack".parse::<Command>().unwrap(), Command::Ack(None));
        assert_eq!(
            "a intro".parse::<Command>().unwrap(),
            Command::Ack(Some("intro".to_string()))
        );
        assert_eq!(
            "click inventory".parse::<Command>().unwrap(),
            Command::Click("inventory".to_string())
        );
        assert_eq!(
            "terminate --invoke intro".parse::<Command>().unwrap(),
            Command::Terminate {
                session: "intro".to_string(),
                invoke: true
            }
        );
        assert_eq!("  quit ".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!("click".parse::<Command>(), Err(CommandError::MissingArgument("click")));
        assert_eq!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown("dance".to_string()))
        );
        assert_eq!(
            "terminate a b".parse::<Command>(),
            Err(CommandError::UnexpectedArgument("b".to_string()))
        );
    }

    fn playback() -> (Playback, SessionId) {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::named(
            "intro",
            vec![Step::message("hello"), Step::button("map")],
        ));
        (Playback::new(director, &PlaybackConfig::default()), id)
    }

    #[test]
    fn test_apply_drives_director() {
        let (mut playback, id) = playback();
        assert!(playback.is_idle());

        playback.apply(Command::Queue("intro".to_string())).unwrap();
        assert!(!playback.is_idle());

        playback.apply(Command::Ack(None)).unwrap();
        assert_eq!(playback.director().session(id).unwrap().current_step_index(), 1);

        playback.apply(Command::Click("map".to_string())).unwrap();
        assert_eq!(
            playback.director().session(id).unwrap().state(),
            SessionState::Done
        );
        assert!(playback.is_idle());
    }

    #[test]
    fn test_empty_session_does_not_keep_playback_alive() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::named("empty", vec![]));
        let mut playback = Playback::new(director, &PlaybackConfig::default());

        playback.apply(Command::Queue("empty".to_string())).unwrap();
        assert_eq!(
            playback.director().session(id).unwrap().state(),
            SessionState::Running
        );
        assert!(playback.is_idle());
    }

    #[test]
    fn test_unknown_session_is_an_error() {
        let (mut playback, _) = playback();
        assert!(matches!(
            playback.apply(Command::Run("nope".to_string())),
            Err(PlaybackError::NoSuchSession(_))
        ));
        assert_eq!(playback.apply(Command::Quit).unwrap(), Flow::Quit);
    }

    #[test]
    fn test_status_lists_sessions() {
        let (mut playback, _) = playback();
        playback.apply(Command::Queue("intro".to_string())).unwrap();
        let lines = playback.status_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("intro"));
        assert!(lines[0].contains("RUNNING"));
        assert!(lines[0].contains("step 1/2 *"));
    }
}
