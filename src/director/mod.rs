//! The director: cross-session arbitration.
//!
//! Owns every session, the ordered set of registered sessions and the FIFO
//! queue of sessions waiting for a turn. At most one registered session may
//! be executing a step at a time; `run_next` only admits the next queued
//! session when nobody is busy.
//!
//! Everything is single-threaded and driven by discrete external calls
//! (signals, `advance`). Callbacks to the owner are recorded as
//! `SessionEvent`s and drained with `drain_events`.

mod lifecycle;

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use thiserror::Error;

use crate::actions::ActionRegistry;
use crate::config::DirectorConfig;
use crate::presenter::Presenter;
use crate::session::{Session, SessionId};
use crate::step::{Step, StepKindTag};
use crate::timer::TimerQueue;

/// Errors surfaced by director operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectorError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("step index {index} is out of range for {session} ({total} steps)")]
    StepOutOfRange {
        session: SessionId,
        index: usize,
        total: usize,
    },
}

/// Notifications for the owner of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session left READY and armed its steps
    Started { session: SessionId },
    /// A step finished; `step` is None when it was skipped
    StepCompleted {
        session: SessionId,
        step: Option<usize>,
    },
    /// Every step completed
    Completed { session: SessionId },
    /// Session was terminated early
    Terminated { session: SessionId },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Started { session }
            | SessionEvent::StepCompleted { session, .. }
            | SessionEvent::Completed { session }
            | SessionEvent::Terminated { session } => *session,
        }
    }
}

/// What a pending timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPurpose {
    /// Step delay elapsed; run the step's work phase
    StepDelay { session: SessionId, index: usize },
    /// Session start delay elapsed; execute its current step
    SessionStart { session: SessionId },
}

impl TimerPurpose {
    fn session(&self) -> SessionId {
        match self {
            TimerPurpose::StepDelay { session, .. } | TimerPurpose::SessionStart { session } => {
                *session
            }
        }
    }
}

/// A step blocked on another session finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Waiter {
    target: SessionId,
    waiting: SessionId,
    step: usize,
}

/// Scheduler and registry for tutorial sessions
pub struct Director {
    sessions: BTreeMap<SessionId, Session>,
    next_id: u64,
    registered: Vec<SessionId>,
    queue: VecDeque<SessionId>,
    waiters: Vec<Waiter>,
    timers: TimerQueue<TimerPurpose>,
    presenter: Box<dyn Presenter>,
    actions: ActionRegistry,
    events: Vec<SessionEvent>,
    config: DirectorConfig,
}

impl Director {
    /// Create a director with default configuration and no actions
    pub fn new(presenter: impl Presenter + 'static) -> Self {
        Self::with_config(presenter, ActionRegistry::new(), DirectorConfig::default())
    }

    pub fn with_config(
        presenter: impl Presenter + 'static,
        actions: ActionRegistry,
        config: DirectorConfig,
    ) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 0,
            registered: Vec::new(),
            queue: VecDeque::new(),
            waiters: Vec::new(),
            timers: TimerQueue::new(),
            presenter: Box::new(presenter),
            actions,
            events: Vec::new(),
            config,
        }
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Every session the director owns, in the order they were added
    pub fn sessions(&self) -> impl Iterator<Item = (SessionId, &Session)> {
        self.sessions.iter().map(|(id, s)| (*id, s))
    }

    /// Registered sessions, in registration order
    pub fn registered(&self) -> &[SessionId] {
        &self.registered
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.registered.contains(&id)
    }

    /// Sessions waiting for a turn, front first
    pub fn queued(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.queue.iter().copied()
    }

    /// Owner notifications recorded so far, oldest first
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn get(&self, id: SessionId) -> Result<&Session, DirectorError> {
        self.sessions
            .get(&id)
            .ok_or(DirectorError::UnknownSession(id))
    }

    fn get_mut(&mut self, id: SessionId) -> Result<&mut Session, DirectorError> {
        self.sessions
            .get_mut(&id)
            .ok_or(DirectorError::UnknownSession(id))
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Add a session to the registered set (no-op if already there)
    pub fn register(&mut self, id: SessionId) -> Result<(), DirectorError> {
        self.get(id)?;
        if !self.registered.contains(&id) {
            tracing::debug!(session = %id, "registered");
            self.registered.push(id);
        }
        Ok(())
    }

    /// Remove a session from the registered set, then optionally admit the
    /// next queued session
    pub fn deregister(&mut self, id: SessionId, promote_next: bool) -> Result<(), DirectorError> {
        self.get(id)?;
        self.deregister_quiet(id, promote_next);
        Ok(())
    }

    fn deregister_quiet(&mut self, id: SessionId, promote_next: bool) {
        if let Some(pos) = self.registered.iter().position(|r| *r == id) {
            self.registered.remove(pos);
            tracing::debug!(session = %id, "deregistered");
        }
        if promote_next {
            self.run_next();
        }
    }

    // ─── Queue ───────────────────────────────────────────────────────────────

    /// Append a session to the FIFO queue (no duplicates). Runs the next
    /// queued session straight away when idle and `run_if_idle` is set.
    pub fn enqueue(&mut self, id: SessionId, run_if_idle: bool) -> Result<(), DirectorError> {
        self.get(id)?;
        if !self.queue.contains(&id) {
            tracing::debug!(session = %id, position = self.queue.len(), "queued");
            self.queue.push_back(id);
        }
        if run_if_idle && !self.is_busy() {
            self.run_next();
        }
        Ok(())
    }

    /// Admit the next queued session if nobody is busy.
    ///
    /// Entries that are already executing, finished or gone are discarded.
    pub fn run_next(&mut self) {
        if self.is_busy() {
            return;
        }
        while let Some(id) = self.queue.pop_front() {
            let stale = self
                .sessions
                .get(&id)
                .map_or(true, |s| s.is_executing() || s.is_finished());
            if stale {
                tracing::debug!(session = %id, "dropping stale queue entry");
                continue;
            }
            tracing::info!(session = %id, "admitting queued session");
            self.run_session(id);
            break;
        }
    }

    /// True iff any registered session is executing a step or waiting out
    /// its start delay
    pub fn is_busy(&self) -> bool {
        self.registered.iter().any(|id| {
            self.sessions.get(id).is_some_and(Session::is_executing) || self.start_pending(*id)
        })
    }

    /// The session was admitted and its start delay has not elapsed yet
    fn start_pending(&self, id: SessionId) -> bool {
        self.timers
            .contains_where(|p| *p == TimerPurpose::SessionStart { session: id })
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    /// First registered session whose name contains `query`
    pub fn find_by_name(&self, query: &str) -> Option<SessionId> {
        self.registered
            .iter()
            .copied()
            .find(|id| self.sessions.get(id).is_some_and(|s| s.matches_name(query)))
    }

    pub fn has_by_name(&self, query: &str) -> bool {
        self.find_by_name(query).is_some()
    }

    /// Lookup for cross-session waits: registered sessions first, then any
    /// owned session, never `exclude` itself
    fn lookup_target(&self, query: &str, exclude: SessionId) -> Option<SessionId> {
        let matches = |id: &SessionId| {
            *id != exclude && self.sessions.get(id).is_some_and(|s| s.matches_name(query))
        };
        self.registered
            .iter()
            .copied()
            .find(|id| matches(id))
            .or_else(|| self.sessions.keys().copied().find(|id| matches(id)))
    }

    /// Whether the first executing registered session is on a step of `kind`
    pub fn is_executing_step_of_kind(&self, kind: StepKindTag) -> bool {
        self.find_executing_step_of_kind(kind).is_some()
    }

    /// The current step of the first executing registered session, if it is
    /// of `kind`
    pub fn find_executing_step_of_kind(&self, kind: StepKindTag) -> Option<(SessionId, &Step)> {
        let id = self
            .registered
            .iter()
            .copied()
            .find(|id| self.sessions.get(id).is_some_and(Session::is_executing))?;
        let step = self.sessions.get(&id)?.current_step()?;
        (step.tag() == kind).then_some((id, step))
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Forget every registration, pending timer and cross-session wait.
    ///
    /// The queue is drained too unless `reset_clears_queue` is off.
    /// Sessions stay owned by the director.
    pub fn reset(&mut self) {
        tracing::info!(
            registered = self.registered.len(),
            queued = self.queue.len(),
            "resetting director"
        );
        self.registered.clear();
        if self.config.reset_clears_queue {
            self.queue.clear();
        }
        self.waiters.clear();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::NullPresenter;

    fn director_with(names: &[&str]) -> (Director, Vec<SessionId>) {
        let mut director = Director::new(NullPresenter);
        let ids = names
            .iter()
            .map(|name| director.add_session(Session::named(*name, vec![Step::message("m")])))
            .collect();
        (director, ids)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut director, ids) = director_with(&["a"]);
        director.register(ids[0]).unwrap();
        director.register(ids[0]).unwrap();
        assert_eq!(director.registered(), &[ids[0]]);

        director.deregister(ids[0], false).unwrap();
        director.deregister(ids[0], false).unwrap();
        assert!(director.registered().is_empty());
    }

    #[test]
    fn test_unknown_session() {
        let mut director = Director::new(NullPresenter);
        let ghost = SessionId(42);
        assert_eq!(
            director.register(ghost),
            Err(DirectorError::UnknownSession(ghost))
        );
        assert!(director.enqueue(ghost, true).is_err());
    }

    #[test]
    fn test_enqueue_without_running() {
        let (mut director, ids) = director_with(&["a", "b"]);
        director.enqueue(ids[0], false).unwrap();
        director.enqueue(ids[1], false).unwrap();
        director.enqueue(ids[0], false).unwrap();
        assert_eq!(director.queued().collect::<Vec<_>>(), vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_find_by_name_in_registration_order() {
        let (mut director, ids) = director_with(&["tour-inventory", "tour-map", "intro"]);
        assert_eq!(director.find_by_name("tour"), None, "unregistered sessions are not found");

        director.register(ids[1]).unwrap();
        director.register(ids[0]).unwrap();
        assert_eq!(director.find_by_name("tour"), Some(ids[1]));
        assert_eq!(director.find_by_name("inventory"), Some(ids[0]));
        assert!(!director.has_by_name("intro"));
    }

    #[test]
    fn test_lookup_target_falls_back_to_owned_sessions() {
        let (mut director, ids) = director_with(&["chain-a", "chain-b"]);
        director.register(ids[0]).unwrap();
        assert_eq!(director.lookup_target("chain", ids[0]), Some(ids[1]));
        assert_eq!(director.lookup_target("chain-a", ids[0]), None);
    }

    #[test]
    fn test_reset_clears_queue_by_default() {
        let (mut director, ids) = director_with(&["a", "b"]);
        director.register(ids[0]).unwrap();
        director.enqueue(ids[1], false).unwrap();

        director.reset();
        assert!(director.registered().is_empty());
        assert_eq!(director.queued().count(), 0);
        assert!(director.session(ids[0]).is_some());
    }

    #[test]
    fn test_reset_can_keep_queue() {
        let mut director = Director::with_config(
            NullPresenter,
            ActionRegistry::new(),
            DirectorConfig {
                reset_clears_queue: false,
            },
        );
        let id = director.add_session(Session::new(vec![]));
        director.enqueue(id, false).unwrap();

        director.reset();
        assert_eq!(director.queued().collect::<Vec<_>>(), vec![id]);
    }
}
