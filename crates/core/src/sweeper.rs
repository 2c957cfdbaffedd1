use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::DEFAULT_SWEEP_INTERVAL;
use crate::model::ReminderTier;
use crate::notify::{Notification, NotificationSink};
use crate::scheduler::ReminderScheduler;
use crate::store::TaskStore;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub overdue: usize,
    pub tiers_fired: usize,
    pub armed: usize,
    pub persisted: bool,
}

impl SweepReport {
    pub fn delivered(&self) -> usize {
        self.overdue + self.tiers_fired
    }
}

/// Reconciles reminder state with the wall clock after a load and on a fixed interval,
/// covering time that passed while no timer could fire.
#[derive(Debug, Clone, Copy)]
pub struct CatchUpSweeper {
    interval: Duration,
}

impl Default for CatchUpSweeper {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl CatchUpSweeper {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One reconciliation pass. Overdue tasks get a single overdue notice and are closed
    /// out; otherwise only the most urgent tier whose window has opened is delivered and
    /// any earlier tiers are marked as passed. Remaining future tiers are re-armed. The
    /// store is written at most once.
    pub fn sweep<T: Timer, S: NotificationSink + ?Sized>(
        &self,
        store: &mut TaskStore,
        scheduler: &mut ReminderScheduler<T>,
        sink: &S,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let mut changed = false;

        for task in store.tasks_mut() {
            if !task.awaiting_reminders() {
                continue;
            }
            let Some(due) = task.due_date else {
                continue;
            };

            if due <= now {
                scheduler.cancel_reminders(task.id);
                task.mark_tier_fired(ReminderTier::AtDue);
                changed = true;
                report.overdue += 1;
                sink.deliver(&Notification::overdue(task));
                continue;
            }

            let most_urgent = ReminderTier::ALL
                .into_iter()
                .filter(|tier| tier.trigger_at(due) <= now && task.tier_pending(*tier))
                .last();
            if let Some(tier) = most_urgent {
                for passed in ReminderTier::ALL.into_iter().filter(|t| *t <= tier) {
                    task.reminders.mark_fired(passed);
                }
                changed = true;
                report.tiers_fired += 1;
                sink.deliver(&Notification::reminder(task, tier));
            }

            report.armed += scheduler.schedule_reminders(task, now);
        }

        if changed {
            match store.persist(now) {
                Ok(()) => report.persisted = true,
                Err(err) => tracing::warn!(error = %err, "failed to persist sweep results"),
            }
        }

        if report.delivered() > 0 {
            tracing::info!(
                overdue = report.overdue,
                tiers_fired = report.tiers_fired,
                armed = report.armed,
                "catch-up sweep delivered reminders"
            );
        } else {
            tracing::debug!(armed = report.armed, "catch-up sweep found nothing due");
        }
        report
    }
}
