//! Session driving: run, queue, complete, skip, terminate.
//!
//! Every transition of a session and its steps goes through here so the
//! director can keep the registry, the queue, pending timers and
//! cross-session waits consistent. Completion cascades (auto-advance, a
//! finished session releasing waiters and promoting the next queued one)
//! recurse through these methods on the same call stack.

use std::time::Duration;

use super::{Director, DirectorError, SessionEvent, TimerPurpose, Waiter};
use crate::session::{Session, SessionId, SessionState};
use crate::step::{Deferred, Work};

impl Director {
    /// Take ownership of a session. It is not registered until `init`.
    pub fn add_session(&mut self, session: Session) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        tracing::debug!(
            session = %id,
            name = session.name().unwrap_or("<unnamed>"),
            steps = session.total_steps(),
            "session added"
        );
        self.sessions.insert(id, session);
        id
    }

    /// Destroy a session: deregister it, drop its queue entry, timers and
    /// waits, and release anything waiting on it.
    pub fn remove_session(&mut self, id: SessionId) -> Result<Session, DirectorError> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or(DirectorError::UnknownSession(id))?;
        self.queue.retain(|q| *q != id);
        self.timers.cancel_where(|p| p.session() == id);
        self.waiters.retain(|w| w.waiting != id);
        self.release_waiters(id);
        self.deregister_quiet(id, true);
        Ok(session)
    }

    /// One-time setup: registers the session with the director
    pub fn init(&mut self, id: SessionId) -> Result<(), DirectorError> {
        if self.get_mut(id)?.mark_initialized() {
            self.register(id)?;
        }
        Ok(())
    }

    /// Ask for a turn; runs immediately if nothing else is busy
    pub fn queue(&mut self, id: SessionId) -> Result<(), DirectorError> {
        self.init(id)?;
        self.enqueue(id, true)
    }

    /// Start the session, or retry its current step if it is already running
    pub fn run(&mut self, id: SessionId) -> Result<(), DirectorError> {
        self.init(id)?;
        self.run_session(id);
        Ok(())
    }

    pub(super) fn run_session(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        if session.state() == SessionState::Ready {
            if session.transition(SessionState::Running).is_err() {
                return;
            }
            tracing::info!(
                session = %id,
                name = session.name().unwrap_or("<unnamed>"),
                from = session.current_step_index(),
                "session started"
            );

            let presenter = self.presenter.as_mut();
            for step in session.remaining_steps_mut() {
                step.init();
                step.pre_execute(presenter);
            }
            self.events.push(SessionEvent::Started { session: id });

            let start_delay = session.start_delay();
            if !start_delay.is_zero() {
                self.timers
                    .schedule(start_delay, TimerPurpose::SessionStart { session: id });
                return;
            }
        }

        self.execute_current(id);
    }

    /// Begin the current step if it can execute
    fn execute_current(&mut self, id: SessionId) {
        if self.start_pending(id) {
            return;
        }

        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.is_finished() {
            return;
        }
        let index = session.current_step_index();
        let Some(step) = session.current_step_mut() else {
            return;
        };
        if !step.begin() {
            return;
        }

        let delay = step.delay();
        tracing::debug!(session = %id, step = index, kind = %step.tag(), ?delay, "step executing");
        if delay.is_zero() {
            self.work_phase(id, index);
        } else {
            self.timers
                .schedule(delay, TimerPurpose::StepDelay { session: id, index });
        }
    }

    fn work_phase(&mut self, id: SessionId, index: usize) {
        let work = {
            let Some(step) = self.sessions.get_mut(&id).and_then(|s| s.step_mut(index)) else {
                return;
            };
            if !step.is_executing() {
                return;
            }
            step.render(self.presenter.as_mut())
        };

        match work {
            Work::Complete => self.complete_step(id, index),
            Work::Wait => {
                tracing::debug!(session = %id, step = index, "waiting for external signal");
            }
            Work::WaitForSession { target, run_target } => {
                self.wait_for_session(id, index, &target, run_target);
            }
        }
    }

    fn wait_for_session(&mut self, id: SessionId, index: usize, target: &str, run_target: bool) {
        let Some(target_id) = self.lookup_target(target, id) else {
            tracing::warn!(session = %id, step = index, target, "target session not found, not waiting");
            self.complete_step(id, index);
            return;
        };

        if self.sessions.get(&target_id).is_some_and(Session::is_finished) {
            self.complete_step(id, index);
            return;
        }

        tracing::debug!(session = %id, step = index, target = %target_id, "waiting for session");
        self.waiters.push(Waiter {
            target: target_id,
            waiting: id,
            step: index,
        });
        if run_target {
            if let Err(e) = self.run(target_id) {
                tracing::warn!(error = %e, "could not run target session");
            }
        }
    }

    /// Complete step `index` of a session, if it is the current, executing step
    fn complete_step(&mut self, id: SessionId, index: usize) {
        {
            let Some(session) = self.sessions.get_mut(&id) else {
                return;
            };
            if session.is_finished() || session.current_step_index() != index {
                return;
            }
            let Some(step) = session.step_mut(index) else {
                return;
            };
            if !step.finish() {
                return;
            }
            step.on_complete(self.presenter.as_mut(), &mut self.actions);
        }
        self.forget_step(id, index);
        tracing::debug!(session = %id, step = index, "step complete");
        self.on_step_complete(id, Some(index));
    }

    /// Drop the timer and cross-session wait belonging to one step
    fn forget_step(&mut self, id: SessionId, index: usize) {
        self.timers
            .cancel_where(|p| *p == TimerPurpose::StepDelay { session: id, index });
        self.waiters.retain(|w| !(w.waiting == id && w.step == index));
    }

    fn on_step_complete(&mut self, id: SessionId, step: Option<usize>) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let finished = session.advance();
        let auto_advance = session.auto_advance();
        self.events
            .push(SessionEvent::StepCompleted { session: id, step });

        if finished {
            self.finish_session(id);
        } else if auto_advance {
            self.run_session(id);
        }
    }

    fn finish_session(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.transition(SessionState::Done).is_err() {
            return;
        }
        tracing::info!(
            session = %id,
            name = session.name().unwrap_or("<unnamed>"),
            "session complete"
        );
        self.events.push(SessionEvent::Completed { session: id });
        self.release_waiters(id);
        self.deregister_quiet(id, true);
    }

    /// Complete every step that was waiting on `target`, in subscription order
    fn release_waiters(&mut self, target: SessionId) {
        let (released, kept): (Vec<Waiter>, Vec<Waiter>) =
            self.waiters.drain(..).partition(|w| w.target == target);
        self.waiters = kept;
        for waiter in released {
            self.complete_step(waiter.waiting, waiter.step);
        }
    }

    // ─── Owner operations ────────────────────────────────────────────────────

    /// Advance past the current step as if it had completed, without its
    /// completion side effects. An executing step is restored first.
    pub fn skip(&mut self, id: SessionId) -> Result<(), DirectorError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(DirectorError::UnknownSession(id))?;
        if session.is_finished() {
            return Ok(());
        }
        let index = session.current_step_index();
        let Some(step) = session.current_step_mut() else {
            return Ok(());
        };
        if step.is_executing() {
            step.restore(self.presenter.as_mut());
        }
        step.force_complete();
        self.forget_step(id, index);
        tracing::debug!(session = %id, step = index, "step skipped");
        self.on_step_complete(id, None);
        Ok(())
    }

    /// Jump to `index` without touching any step. Out-of-range indices are
    /// rejected and leave the session unchanged.
    pub fn skip_to(&mut self, id: SessionId, index: usize) -> Result<(), DirectorError> {
        let session = self.get_mut(id)?;
        let total = session.total_steps();
        if index >= total {
            return Err(DirectorError::StepOutOfRange {
                session: id,
                index,
                total,
            });
        }
        session.set_index(index);
        Ok(())
    }

    /// Jump to the last step
    pub fn skip_to_end(&mut self, id: SessionId) -> Result<(), DirectorError> {
        let session = self.get_mut(id)?;
        let last = session.last_index();
        session.set_index(last);
        Ok(())
    }

    /// Force a session to DONE.
    ///
    /// Jumps to the last step, optionally fires that step's held-back
    /// events, restores every step if the session had started, then
    /// deregisters it and admits the next queued session.
    pub fn terminate(&mut self, id: SessionId, invoke_last_step: bool) -> Result<(), DirectorError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(DirectorError::UnknownSession(id))?;
        if session.is_finished() {
            return Ok(());
        }

        let last = session.last_index();
        session.set_index(last);
        let started = session.state() != SessionState::Ready;

        let presenter = self.presenter.as_mut();
        let mut deferred = None;
        if invoke_last_step {
            if let Some(step) = session.step_mut(last) {
                deferred = step.invoke_events(presenter, &mut self.actions);
            }
        }
        if started {
            for step in session.steps_mut() {
                step.restore(presenter);
            }
        }
        if session.transition(SessionState::Done).is_err() {
            return Ok(());
        }
        tracing::info!(session = %id, invoke_last_step, "session terminated");

        self.timers.cancel_where(|p| p.session() == id);
        self.waiters.retain(|w| w.waiting != id);
        self.events.push(SessionEvent::Terminated { session: id });

        if let Some(Deferred::QueueSession(target)) = deferred {
            match self.lookup_target(&target, id) {
                Some(target_id) => self.queue(target_id)?,
                None => tracing::warn!(session = %id, target, "chained session not found"),
            }
        }

        self.release_waiters(id);
        self.deregister_quiet(id, true);
        Ok(())
    }

    // ─── External signals ────────────────────────────────────────────────────

    /// The user acknowledged the message shown by a session.
    /// Returns whether a waiting message step consumed it.
    pub fn acknowledge(&mut self, id: SessionId) -> Result<bool, DirectorError> {
        let session = self.get(id)?;
        let index = session.current_step_index();
        let waiting = !session.is_finished()
            && session
                .current_step()
                .is_some_and(|s| s.is_awaiting_acknowledgment());
        if waiting {
            self.complete_step(id, index);
        }
        Ok(waiting)
    }

    /// A control was clicked. Completes the first executing step (in session
    /// order) intercepting it. Returns whether the click was consumed.
    pub fn click(&mut self, control: &str) -> bool {
        let hit = self.sessions.iter().find_map(|(id, session)| {
            let step = session.current_step()?;
            (session.is_executing() && step.intercepted_control() == Some(control))
                .then_some((*id, session.current_step_index()))
        });
        match hit {
            Some((id, index)) => {
                tracing::debug!(session = %id, step = index, control, "intercepted click");
                self.complete_step(id, index);
                true
            }
            None => false,
        }
    }

    /// Completion signal for whatever step is executing
    pub fn complete_current_step(&mut self, id: SessionId) -> Result<bool, DirectorError> {
        let session = self.get(id)?;
        let index = session.current_step_index();
        if !session.is_executing() {
            return Ok(false);
        }
        self.complete_step(id, index);
        Ok(true)
    }

    // ─── Time ────────────────────────────────────────────────────────────────

    /// Move the virtual clock forward by `elapsed` and fire every timer that
    /// comes due in that window, each at its own deadline
    pub fn advance(&mut self, elapsed: Duration) {
        let target = self.timers.now() + elapsed;
        while let Some(purpose) = self.timers.pop_until(target) {
            match purpose {
                TimerPurpose::StepDelay { session, index } => {
                    let current = self
                        .sessions
                        .get(&session)
                        .is_some_and(|s| !s.is_finished() && s.current_step_index() == index);
                    if current {
                        self.work_phase(session, index);
                    }
                }
                TimerPurpose::SessionStart { session } => self.execute_current(session),
            }
        }
        self.timers.settle(target);
    }

    /// Time until the next pending timer, if any
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::NullPresenter;
    use crate::step::Step;

    #[test]
    fn test_init_registers_once() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::new(vec![Step::message("m")]));

        director.init(id).unwrap();
        director.deregister(id, false).unwrap();
        director.init(id).unwrap();
        assert!(!director.is_registered(id), "init is one-time");
    }

    #[test]
    fn test_run_empty_session() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::new(vec![]));

        director.run(id).unwrap();
        let session = director.session(id).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.current_step().is_none());
        assert!(!director.is_busy());
    }

    #[test]
    fn test_step_delay_defers_work_phase() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::new(vec![
            Step::generic().with_delay(Duration::from_millis(200))
        ]));

        director.run(id).unwrap();
        assert!(director.session(id).unwrap().is_executing());
        assert_eq!(director.next_deadline(), Some(Duration::from_millis(200)));

        director.advance(Duration::from_millis(199));
        assert!(director.session(id).unwrap().is_executing());

        director.advance(Duration::from_millis(1));
        assert!(director.session(id).unwrap().is_finished());
        assert!(!director.has_pending_timers());
    }

    #[test]
    fn test_repeated_run_does_not_double_schedule() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::new(vec![
            Step::generic().with_delay(Duration::from_millis(50))
        ]));

        director.run(id).unwrap();
        director.run(id).unwrap();
        director.run(id).unwrap();
        assert_eq!(director.timers.len(), 1);
    }

    #[test]
    fn test_start_delay_holds_first_step() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(
            Session::new(vec![Step::message("hello")]).with_start_delay(Duration::from_secs(1)),
        );

        director.run(id).unwrap();
        director.run(id).unwrap();
        let session = director.session(id).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(!session.is_executing());

        director.advance(Duration::from_secs(1));
        assert!(director.session(id).unwrap().is_executing());
    }

    #[test]
    fn test_complete_current_step_is_absorbed_when_idle() {
        let mut director = Director::new(NullPresenter);
        let id = director.add_session(Session::new(vec![Step::message("a")]));
        assert!(!director.complete_current_step(id).unwrap());

        director.run(id).unwrap();
        assert!(director.complete_current_step(id).unwrap());
        assert!(!director.complete_current_step(id).unwrap());
        assert!(director.session(id).unwrap().is_finished());
    }
}
