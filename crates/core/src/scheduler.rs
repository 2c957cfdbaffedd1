use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{ReminderTier, TaskId, TaskRecord};
use crate::timer::{ReminderEvent, Timer, TimerHandle};

#[derive(Debug, Clone, Copy)]
struct ArmedReminder {
    tier: ReminderTier,
    handle: TimerHandle,
}

/// Arms and disarms reminder timers. The armed-timer table is process-local and starts
/// empty on every load; the persisted flags on [`TaskRecord`] are the source of truth.
pub struct ReminderScheduler<T> {
    timer: T,
    armed: HashMap<TaskId, Vec<ArmedReminder>>,
}

impl<T: Timer> ReminderScheduler<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            armed: HashMap::new(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Arm every tier of `task` that has not fired and triggers after `now`.
    ///
    /// Existing timers for the task are cancelled first, so calling this repeatedly never
    /// stacks duplicates. Tiers whose trigger time is not in the future are left to the
    /// catch-up sweep. Returns the number of timers armed.
    pub fn schedule_reminders(&mut self, task: &TaskRecord, now: DateTime<Utc>) -> usize {
        self.cancel_reminders(task.id);
        let Some(due) = task.due_date else {
            return 0;
        };
        if task.completed || task.notified {
            return 0;
        }

        let mut armed = Vec::new();
        for tier in ReminderTier::ALL {
            if !task.tier_pending(tier) {
                continue;
            }
            let trigger = tier.trigger_at(due);
            if trigger <= now {
                continue;
            }
            let Ok(delay) = (trigger - now).to_std() else {
                continue;
            };
            let handle = self.timer.schedule(
                delay,
                ReminderEvent {
                    task_id: task.id,
                    tier,
                },
            );
            tracing::debug!(
                task_id = task.id,
                tier = tier.as_str(),
                delay_secs = delay.as_secs(),
                "reminder armed"
            );
            armed.push(ArmedReminder { tier, handle });
        }

        let count = armed.len();
        if count > 0 {
            self.armed.insert(task.id, armed);
        }
        count
    }

    /// Cancel every armed timer for `task_id`. Returns how many handles were dropped.
    pub fn cancel_reminders(&mut self, task_id: TaskId) -> usize {
        let Some(armed) = self.armed.remove(&task_id) else {
            return 0;
        };
        for reminder in &armed {
            self.timer.cancel(reminder.handle);
        }
        tracing::debug!(task_id, count = armed.len(), "reminders cancelled");
        armed.len()
    }

    /// Forget the handle behind an elapsed timer.
    pub fn timer_elapsed(&mut self, event: &ReminderEvent) {
        if let Some(armed) = self.armed.get_mut(&event.task_id) {
            armed.retain(|reminder| reminder.tier != event.tier);
            if armed.is_empty() {
                self.armed.remove(&event.task_id);
            }
        }
    }

    pub fn armed_tiers(&self, task_id: TaskId) -> Vec<ReminderTier> {
        self.armed
            .get(&task_id)
            .map(|armed| armed.iter().map(|reminder| reminder.tier).collect())
            .unwrap_or_default()
    }

    pub fn armed_count(&self) -> usize {
        self.armed.values().map(Vec::len).sum()
    }

    pub fn cancel_all(&mut self) {
        let ids: Vec<TaskId> = self.armed.keys().copied().collect();
        for id in ids {
            self.cancel_reminders(id);
        }
    }
}

/// Fire-time guard: check the tier is still pending and mark it fired in one step.
/// Returns `false` when the reminder must not be delivered.
pub fn claim_tier(task: &mut TaskRecord, tier: ReminderTier) -> bool {
    if !task.tier_pending(tier) {
        return false;
    }
    task.mark_tier_fired(tier);
    true
}

/// True when a later tier's window has already opened at `now`, so a timer for `tier`
/// arrived too late to describe the task (a wake from suspend, a stalled loop).
pub fn superseded(task: &TaskRecord, tier: ReminderTier, now: DateTime<Utc>) -> bool {
    let Some(due) = task.due_date else {
        return false;
    };
    tier.later().any(|later| later.trigger_at(due) <= now)
}
