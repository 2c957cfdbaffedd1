use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::capture::TaskInput;
use crate::model::{
    AddOutcome, DeleteResult, TaskFilter, TaskId, TaskRecord, TaskStats, ToggleResult,
};
use crate::notify::{Notification, NotificationSink, Permission, PermissionState};
use crate::parser;
use crate::scheduler::{claim_tier, superseded, ReminderScheduler};
use crate::storage::NOTIFICATIONS_KEY;
use crate::store::TaskStore;
use crate::sweeper::{CatchUpSweeper, SweepReport};
use crate::timer::{ReminderEvent, Timer};

/// Owns the task store and everything that reacts to it. All user actions, timer
/// callbacks and sweeps go through here, on a single logical thread.
pub struct TaskManager<T, S> {
    store: TaskStore,
    scheduler: ReminderScheduler<T>,
    sweeper: CatchUpSweeper,
    sink: S,
    permission: PermissionState,
}

impl<T: Timer, S: NotificationSink> TaskManager<T, S> {
    /// Assemble a manager around a loaded store. The persisted permission decision is
    /// copied into `permission` so sinks sharing it see the same state.
    pub fn new(
        store: TaskStore,
        timer: T,
        sink: S,
        permission: PermissionState,
        sweeper: CatchUpSweeper,
    ) -> Self {
        let stored = match store.storage().get(NOTIFICATIONS_KEY) {
            Ok(value) => Permission::from_stored(value.as_deref()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read notification permission");
                Permission::Default
            }
        };
        permission.set(stored);
        Self {
            store,
            scheduler: ReminderScheduler::new(timer),
            sweeper,
            sink,
            permission,
        }
    }

    /// Catch-up pass run once right after load. Rebuilds timers for every live task.
    pub fn startup(&mut self, now: DateTime<Utc>) -> SweepReport {
        if self.permission.get() == Permission::Default {
            tracing::warn!("notifications have not been granted; reminders will be silent");
        }
        self.sweep(now)
    }

    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        self.sweeper
            .sweep(&mut self.store, &mut self.scheduler, &self.sink, now)
    }

    pub fn add(&mut self, input: &TaskInput, now: DateTime<Utc>) -> Result<AddOutcome> {
        let parsed = parser::parse_capture(input, now)?;
        let id = self.store.next_id(now);
        let task = TaskRecord::new(id, parsed.text, parsed.due_date, now);
        self.store.insert(task.clone(), now)?;
        let armed = self.scheduler.schedule_reminders(&task, now);
        tracing::debug!(task_id = id, armed, "task added");
        Ok(AddOutcome {
            id,
            text: task.text,
            due_date: task.due_date,
            armed,
        })
    }

    /// Flip completion. Completing disarms every reminder; reopening re-arms the tiers
    /// that are still in the future.
    pub fn toggle(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<ToggleResult> {
        let Some(completed) = self.store.toggle(id, now)? else {
            return Ok(ToggleResult {
                id,
                found: false,
                completed: false,
            });
        };
        if completed {
            self.scheduler.cancel_reminders(id);
        } else if let Some(task) = self.store.get(id) {
            self.scheduler.schedule_reminders(task, now);
        }
        Ok(ToggleResult {
            id,
            found: true,
            completed,
        })
    }

    pub fn toggle_many(
        &mut self,
        ids: &[TaskId],
        now: DateTime<Utc>,
    ) -> Result<Vec<ToggleResult>> {
        ids.iter().map(|id| self.toggle(*id, now)).collect()
    }

    pub fn delete(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<DeleteResult> {
        self.scheduler.cancel_reminders(id);
        let deleted = self.store.remove(id, now)?.is_some();
        Ok(DeleteResult { id, deleted })
    }

    pub fn delete_many(
        &mut self,
        ids: &[TaskId],
        now: DateTime<Utc>,
    ) -> Result<Vec<DeleteResult>> {
        ids.iter().map(|id| self.delete(*id, now)).collect()
    }

    pub fn clear_completed(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.remove_completed(now)?;
        for task in &removed {
            self.scheduler.cancel_reminders(task.id);
        }
        Ok(removed.len())
    }

    /// Timer callback body. Re-checks the task against its persisted flags and the clock
    /// before delivering; returns whether this event's reminder went out. An event that
    /// arrives after a later tier's window opened is handed to a sweep instead.
    pub fn handle_timer(&mut self, event: ReminderEvent, now: DateTime<Utc>) -> bool {
        self.scheduler.timer_elapsed(&event);
        let Some(task) = self.store.get_mut(event.task_id) else {
            tracing::debug!(task_id = event.task_id, "timer fired for a removed task");
            return false;
        };
        if task.tier_pending(event.tier) && superseded(task, event.tier, now) {
            tracing::debug!(
                task_id = event.task_id,
                tier = event.tier.as_str(),
                "timer fired late; reconciling with a sweep"
            );
            self.sweep(now);
            return false;
        }
        if !claim_tier(task, event.tier) {
            tracing::debug!(
                task_id = event.task_id,
                tier = event.tier.as_str(),
                "timer fired for a settled reminder"
            );
            return false;
        }
        let notification = Notification::reminder(task, event.tier);
        self.sink.deliver(&notification);
        if let Err(err) = self.store.persist(now) {
            tracing::warn!(error = %err, task_id = event.task_id, "failed to persist reminder flag");
        }
        true
    }

    /// Record the user's notification decision and apply it immediately.
    pub fn set_permission(&mut self, granted: bool) -> Result<Permission> {
        let permission = if granted {
            Permission::Granted
        } else {
            Permission::Denied
        };
        if let Some(value) = permission.as_stored() {
            self.store.storage().set(NOTIFICATIONS_KEY, value)?;
        }
        self.permission.set(permission);
        Ok(permission)
    }

    pub fn permission(&self) -> Permission {
        self.permission.get()
    }

    pub fn list(&self, filter: TaskFilter) -> Vec<&TaskRecord> {
        self.store.filtered(filter).collect()
    }

    pub fn stats(&self) -> TaskStats {
        self.store.stats()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.store.get(id)
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn scheduler(&self) -> &ReminderScheduler<T> {
        &self.scheduler
    }

    pub fn timer_mut(&mut self) -> &mut T {
        self.scheduler.timer_mut()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        self.sweeper.interval()
    }

    /// Cancel every outstanding timer.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReminderTier;
    use crate::notify::{DirectSink, RecordingBackend};
    use crate::storage::{MemoryStorage, SqliteStorage, TASKS_KEY};
    use crate::timer::ManualTimer;
    use crate::AppConfig;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    type TestManager = TaskManager<ManualTimer, DirectSink<RecordingBackend>>;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn manager_with(storage: MemoryStorage, now: DateTime<Utc>) -> (TestManager, RecordingBackend) {
        let backend = RecordingBackend::new();
        let permission = PermissionState::default();
        let storage = storage.with_entry(NOTIFICATIONS_KEY, "true");
        let mut manager = TaskManager::new(
            TaskStore::load(Box::new(storage)),
            ManualTimer::new(now),
            DirectSink::new(backend.clone(), permission.clone()),
            permission,
            CatchUpSweeper::default(),
        );
        manager.startup(now);
        (manager, backend)
    }

    fn manager() -> (TestManager, RecordingBackend) {
        manager_with(MemoryStorage::new(), t0())
    }

    fn add(manager: &mut TestManager, text: &str, due: Option<&str>, now: DateTime<Utc>) -> TaskId {
        let input = TaskInput {
            text: text.split_whitespace().map(str::to_string).collect(),
            due: due.map(str::to_string),
        };
        manager.add(&input, now).expect("add task").id
    }

    /// Advance the fake clock and run every elapsed timer through the manager.
    fn run_until(manager: &mut TestManager, to: DateTime<Utc>) -> usize {
        let fired = manager.timer_mut().advance_to(to);
        fired
            .into_iter()
            .filter(|(at, event)| manager.handle_timer(*event, *at))
            .count()
    }

    fn titles(backend: &RecordingBackend) -> Vec<String> {
        backend.delivered().into_iter().map(|n| n.title).collect()
    }

    #[test]
    fn live_timers_fire_each_tier_once_in_order() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Board meeting", Some("+2h"), t0());

        assert_eq!(run_until(&mut manager, t0() + Duration::hours(3)), 3);
        assert_eq!(
            titles(&backend),
            vec!["Task due in 1 hour", "Task due in 15 minutes", "Task due now"]
        );
        let task = manager.task(id).unwrap();
        assert!(task.notified);
        assert!(ReminderTier::ALL.iter().all(|t| task.reminders.is_fired(*t)));

        manager.sweep(t0() + Duration::hours(4));
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn scenario_a_sweep_after_reload_fires_hour_tier_once() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Pay invoice", Some("+2h"), t0());

        // The process was asleep through the hour boundary; its timer never ran.
        let later = t0() + Duration::minutes(61);
        assert_eq!(manager.timer_mut().skip_to(later), 1);
        let report = manager.sweep(later);
        assert_eq!(report.tiers_fired, 1);
        assert_eq!(titles(&backend), vec!["Task due in 1 hour"]);

        assert_eq!(run_until(&mut manager, later), 0);
        manager.sweep(later);
        assert_eq!(run_until(&mut manager, t0() + Duration::minutes(104)), 0);
        assert_eq!(backend.len(), 1);
        assert!(manager.task(id).unwrap().reminders.is_fired(ReminderTier::HourBefore));
    }

    #[test]
    fn scenario_b_past_due_gets_overdue_only() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Renew passport", Some("2025-06-01T09:55:00Z"), t0());
        assert_eq!(manager.scheduler().armed_tiers(id), Vec::new());

        let report = manager.sweep(t0());
        assert_eq!(report.overdue, 1);
        assert_eq!(titles(&backend), vec!["Task overdue"]);
        let task = manager.task(id).unwrap();
        assert!(task.notified);
        assert!(!task.reminders.is_fired(ReminderTier::HourBefore));
        assert!(!task.reminders.is_fired(ReminderTier::QuarterBefore));
    }

    #[test]
    fn late_hour_event_after_due_yields_overdue_notice_only() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "File taxes", Some("+2h"), t0());
        let event = ReminderEvent {
            task_id: id,
            tier: ReminderTier::HourBefore,
        };

        assert!(!manager.handle_timer(event, t0() + Duration::hours(3)));
        assert_eq!(titles(&backend), vec!["Task overdue"]);
        let task = manager.task(id).unwrap();
        assert!(task.notified);
        assert!(!task.reminders.is_fired(ReminderTier::HourBefore));

        assert!(!manager.handle_timer(event, t0() + Duration::hours(3)));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn late_hour_event_inside_quarter_window_sends_quarter_reminder() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Catch train", Some("+2h"), t0());
        let late = t0() + Duration::minutes(110);
        manager.timer_mut().skip_to(late);
        let event = ReminderEvent {
            task_id: id,
            tier: ReminderTier::HourBefore,
        };

        assert!(!manager.handle_timer(event, late));
        assert_eq!(titles(&backend), vec!["Task due in 15 minutes"]);
        assert_eq!(manager.scheduler().armed_tiers(id), vec![ReminderTier::AtDue]);
        assert_eq!(run_until(&mut manager, t0() + Duration::hours(2)), 1);
        assert_eq!(
            titles(&backend),
            vec!["Task due in 15 minutes", "Task due now"]
        );
    }

    #[test]
    fn scenario_c_deleted_task_never_fires() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Take pizza out", Some("+10min"), t0());
        assert_eq!(manager.scheduler().armed_tiers(id), vec![ReminderTier::AtDue]);

        let result = manager.delete(id, t0() + Duration::minutes(1)).unwrap();
        assert!(result.deleted);
        assert_eq!(run_until(&mut manager, t0() + Duration::minutes(10)), 0);
        manager.sweep(t0() + Duration::minutes(11));
        assert!(backend.is_empty());
    }

    #[test]
    fn scenario_d_identical_due_dates_both_notify() {
        let (mut manager, backend) = manager();
        let first = add(&mut manager, "Water plants", Some("+20min"), t0());
        let second = add(&mut manager, "Feed cat", Some("+20min"), t0());
        assert_ne!(first, second);

        run_until(&mut manager, t0() + Duration::minutes(20));
        assert!(manager.task(first).unwrap().notified);
        assert!(manager.task(second).unwrap().notified);
        let due_now = titles(&backend)
            .into_iter()
            .filter(|t| t == "Task due now")
            .count();
        assert_eq!(due_now, 2);
    }

    #[test]
    fn completing_just_before_trigger_suppresses_tier() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Call plumber", Some("+30min"), t0());
        let trigger = t0() + Duration::minutes(15);
        let just_before = trigger - Duration::milliseconds(1);

        assert_eq!(run_until(&mut manager, just_before), 0);
        manager.toggle(id, just_before).unwrap();
        assert_eq!(run_until(&mut manager, t0() + Duration::hours(1)), 0);
        manager.sweep(t0() + Duration::hours(1));
        assert!(backend.is_empty());
    }

    #[test]
    fn guard_rejects_event_that_outlived_cancellation() {
        let (mut manager, backend) = manager();
        let id = add(&mut manager, "Stand-up", Some("+30min"), t0());
        manager.toggle(id, t0()).unwrap();

        // A timer already dequeued by the runtime still reaches the manager.
        let event = ReminderEvent {
            task_id: id,
            tier: ReminderTier::QuarterBefore,
        };
        assert!(!manager.handle_timer(event, t0() + Duration::minutes(15)));
        assert!(backend.is_empty());
    }

    #[test]
    fn reopening_rearms_remaining_tiers() {
        let (mut manager, _backend) = manager();
        let id = add(&mut manager, "Draft memo", Some("+2h"), t0());
        manager.toggle(id, t0()).unwrap();
        assert!(manager.scheduler().armed_tiers(id).is_empty());

        let reopened_at = t0() + Duration::minutes(70);
        manager.timer_mut().skip_to(reopened_at);
        let result = manager.toggle(id, reopened_at).unwrap();
        assert!(!result.completed);
        assert_eq!(
            manager.scheduler().armed_tiers(id),
            vec![ReminderTier::QuarterBefore, ReminderTier::AtDue]
        );
    }

    #[test]
    fn clear_completed_disarms_removed_tasks() {
        let (mut manager, backend) = manager();
        let done = add(&mut manager, "Old chore", Some("+30min"), t0());
        let open = add(&mut manager, "New chore", None, t0());
        manager.toggle(done, t0()).unwrap();

        assert_eq!(manager.clear_completed(t0()).unwrap(), 1);
        assert!(manager.task(done).is_none());
        assert!(manager.task(open).is_some());
        assert_eq!(manager.timer_mut().pending(), 0);
        assert_eq!(run_until(&mut manager, t0() + Duration::hours(1)), 0);
        assert!(backend.is_empty());
    }

    #[test]
    fn empty_text_is_rejected() {
        let (mut manager, _backend) = manager();
        let err = manager
            .add(&TaskInput::from_line("   "), t0())
            .unwrap_err();
        assert_eq!(err.to_string(), "Task text cannot be empty");
        assert_eq!(manager.stats().total, 0);
    }

    #[test]
    fn unknown_ids_are_reported_not_errors() {
        let (mut manager, _backend) = manager();
        let toggled = manager.toggle_many(&[42], t0()).unwrap();
        assert!(!toggled[0].found);
        let deleted = manager.delete_many(&[42], t0()).unwrap();
        assert!(!deleted[0].deleted);
    }

    #[test]
    fn delivery_failure_still_marks_reminder_fired() {
        let backend = RecordingBackend::failing();
        let permission = PermissionState::default();
        let mut manager = TaskManager::new(
            TaskStore::load(Box::new(
                MemoryStorage::new().with_entry(NOTIFICATIONS_KEY, "true"),
            )),
            ManualTimer::new(t0()),
            DirectSink::new(backend.clone(), permission.clone()),
            permission,
            CatchUpSweeper::default(),
        );
        let id = manager
            .add(&TaskInput::from_line("Backup disk due:+5min"), t0())
            .unwrap()
            .id;
        let fired = manager.timer_mut().advance_to(t0() + Duration::minutes(5));
        for (at, event) in fired {
            manager.handle_timer(event, at);
        }
        assert_eq!(backend.len(), 1);
        assert!(manager.task(id).unwrap().notified);
    }

    #[test]
    fn reload_rebuilds_timers_from_persisted_flags() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).unwrap();
        let open = |now| {
            let backend = RecordingBackend::new();
            let permission = PermissionState::default();
            let mut manager = TaskManager::new(
                TaskStore::load(Box::new(SqliteStorage::initialize(&config).unwrap())),
                ManualTimer::new(now),
                DirectSink::new(backend.clone(), permission.clone()),
                permission,
                CatchUpSweeper::default(),
            );
            manager.set_permission(true).unwrap();
            let report = manager.startup(now);
            (manager, backend, report)
        };

        let (mut first, _, _) = open(t0());
        let id = add(&mut first, "Send slides", Some("+90min"), t0());
        let before = first.store().tasks().to_vec();
        drop(first);

        let (second, backend, report) = open(t0() + Duration::minutes(40));
        assert_eq!(report.tiers_fired, 1);
        assert_eq!(titles(&backend), vec!["Task due in 1 hour"]);
        assert_eq!(
            second.scheduler().armed_tiers(id),
            vec![ReminderTier::QuarterBefore, ReminderTier::AtDue]
        );
        let reloaded = second.task(id).unwrap();
        assert_eq!(reloaded.created_at, before[0].created_at);
        assert_eq!(reloaded.due_date, before[0].due_date);
        assert_eq!(second.permission(), Permission::Granted);
    }

    #[test]
    fn corrupt_store_starts_fresh_and_keeps_working() {
        let storage = MemoryStorage::new().with_entry(TASKS_KEY, "[{\"id\":");
        let (mut manager, _backend) = manager_with(storage, t0());
        assert_eq!(manager.stats().total, 0);
        add(&mut manager, "Start over", None, t0());
        assert_eq!(manager.stats().total, 1);
    }
}
