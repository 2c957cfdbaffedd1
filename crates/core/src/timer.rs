//! Deferred-callback capability injected into the reminder scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{ReminderTier, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Payload a timer hands back to the owner of the task store when it elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderEvent {
    pub task_id: TaskId,
    pub tier: ReminderTier,
}

pub trait Timer {
    /// Arm a timer that yields `event` after `delay`.
    fn schedule(&mut self, delay: Duration, event: ReminderEvent) -> TimerHandle;

    /// Cancel a pending timer. Unknown or already-fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Timer for short-lived processes: handles are issued but never fire, since the process
/// exits long before any reminder is due. The next start's catch-up sweep covers them.
#[derive(Debug, Default)]
pub struct DetachedTimer {
    next: u64,
}

impl Timer for DetachedTimer {
    fn schedule(&mut self, _delay: Duration, _event: ReminderEvent) -> TimerHandle {
        self.next += 1;
        TimerHandle(self.next)
    }

    fn cancel(&mut self, _handle: TimerHandle) {}
}

#[derive(Debug, Clone)]
struct PendingTimer {
    handle: TimerHandle,
    fire_at: DateTime<Utc>,
    event: ReminderEvent,
}

/// Deterministic timer driven by an explicit virtual clock.
#[derive(Debug)]
pub struct ManualTimer {
    now: DateTime<Utc>,
    next: u64,
    pending: Vec<PendingTimer>,
}

impl ManualTimer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            next: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Move the clock to `to`, dropping every timer that would have elapsed on the way,
    /// the way timers are lost while a process is not running.
    pub fn skip_to(&mut self, to: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.fire_at > to);
        if to > self.now {
            self.now = to;
        }
        before - self.pending.len()
    }

    /// Move the clock to `to` and return every elapsed event in firing order, each paired
    /// with the instant it fired at.
    pub fn advance_to(&mut self, to: DateTime<Utc>) -> Vec<(DateTime<Utc>, ReminderEvent)> {
        let (mut due, rest): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|timer| timer.fire_at <= to);
        self.pending = rest;
        due.sort_by_key(|timer| (timer.fire_at, timer.handle));
        if to > self.now {
            self.now = to;
        }
        due.into_iter()
            .map(|timer| (timer.fire_at, timer.event))
            .collect()
    }
}

impl Timer for ManualTimer {
    fn schedule(&mut self, delay: Duration, event: ReminderEvent) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        self.pending.push(PendingTimer {
            handle,
            fire_at: self.now + delay,
            event,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|timer| timer.handle != handle);
    }
}
