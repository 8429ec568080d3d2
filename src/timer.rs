//! Virtual delay primitive.
//!
//! Timers are opaque tokens with a deadline on a virtual clock. Nothing here
//! sleeps: the driver (tests, or the playback loop) moves the clock forward
//! and receives the tokens that came due, in deadline order.

use std::time::Duration;

#[derive(Debug, Clone)]
struct PendingTimer<T> {
    /// Scheduling order, breaks deadline ties
    seq: u64,
    deadline: Duration,
    payload: T,
}

/// Pending delays keyed by deadline on a virtual clock
#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTimer<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            pending: Vec::new(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `payload` to come due `delay` after the current virtual time
    pub fn schedule(&mut self, delay: Duration, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingTimer {
            seq,
            deadline: self.now + delay,
            payload,
        });
    }

    /// Drop every pending timer whose payload matches
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) {
        self.pending.retain(|t| !pred(&t.payload));
    }

    /// Whether any pending timer's payload matches
    pub fn contains_where(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.pending.iter().any(|t| pred(&t.payload))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Time remaining until the earliest pending deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending
            .iter()
            .map(|t| t.deadline.saturating_sub(self.now))
            .min()
    }

    /// Pop the earliest timer due at or before `target`, moving the clock to
    /// its deadline first.
    ///
    /// Call repeatedly until it returns None, then `settle(target)`. Timers
    /// scheduled while handling a popped one are measured from its deadline,
    /// so chained delays inside one window all fire.
    pub fn pop_until(&mut self, target: Duration) -> Option<T> {
        let position = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= target)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(i, _)| i)?;
        let timer = self.pending.remove(position);
        self.now = self.now.max(timer.deadline);
        Some(timer.payload)
    }

    /// Move the clock to `target`; the clock never runs backwards
    pub fn settle(&mut self, target: Duration) {
        self.now = self.now.max(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(Duration::from_millis(300), "late");
        timers.schedule(Duration::from_millis(100), "early");
        timers.schedule(Duration::from_millis(100), "early-second");

        let target = Duration::from_millis(500);
        assert_eq!(timers.pop_until(target), Some("early"));
        assert_eq!(timers.now(), Duration::from_millis(100));
        assert_eq!(timers.pop_until(target), Some("early-second"));
        assert_eq!(timers.pop_until(target), Some("late"));
        assert_eq!(timers.now(), Duration::from_millis(300));
        assert_eq!(timers.pop_until(target), None);

        timers.settle(target);
        assert_eq!(timers.now(), target);
    }

    #[test]
    fn test_not_due_until_deadline() {
        let mut timers = TimerQueue::new();
        timers.schedule(Duration::from_millis(250), ());

        assert!(timers.pop_until(Duration::from_millis(249)).is_none());
        timers.settle(Duration::from_millis(249));
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(1)));
        assert!(timers.pop_until(Duration::from_millis(250)).is_some());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_chained_timer_measured_from_fire_time() {
        let mut timers = TimerQueue::new();
        timers.schedule(Duration::from_millis(100), 1);

        let target = Duration::from_millis(500);
        assert_eq!(timers.pop_until(target), Some(1));
        timers.schedule(Duration::from_millis(100), 2);
        assert_eq!(timers.pop_until(target), Some(2));
        assert_eq!(timers.now(), Duration::from_millis(200));
        timers.schedule(Duration::from_millis(400), 3);
        assert_eq!(timers.pop_until(target), None);

        timers.settle(target);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_cancel_where() {
        let mut timers = TimerQueue::new();
        timers.schedule(Duration::from_millis(10), 1);
        timers.schedule(Duration::from_millis(10), 2);

        timers.cancel_where(|p| *p == 2);
        assert!(timers.contains_where(|p| *p == 1));
        assert!(!timers.contains_where(|p| *p == 2));
        timers.clear();
        assert!(timers.is_empty());
    }

    #[test]
    fn test_settle_never_rewinds() {
        let mut timers: TimerQueue<()> = TimerQueue::new();
        timers.settle(Duration::from_millis(50));
        timers.settle(Duration::from_millis(10));
        assert_eq!(timers.now(), Duration::from_millis(50));
    }
}
