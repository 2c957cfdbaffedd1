//! Ordered in-memory task collection mirrored to key-value storage.
//!
//! Every mutating method writes the whole collection back before returning. The
//! collection is only ever read from storage once, in [`TaskStore::load`].

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::model::{TaskFilter, TaskId, TaskRecord, TaskStats};
use crate::storage::{KeyValueStore, LAST_SAVE_KEY, TASKS_KEY};

pub struct TaskStore {
    tasks: Vec<TaskRecord>,
    storage: Box<dyn KeyValueStore>,
}

impl TaskStore {
    /// Load the persisted collection. Unreadable or corrupt data yields an empty store.
    pub fn load(storage: Box<dyn KeyValueStore>) -> Self {
        let tasks = match storage.get(TASKS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<TaskRecord>>(&raw) {
                Ok(tasks) => dedupe_ids(tasks),
                Err(err) => {
                    tracing::warn!(error = %err, "persisted tasks are corrupt; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read persisted tasks; starting empty");
                Vec::new()
            }
        };
        tracing::debug!(count = tasks.len(), "task store loaded");
        Self { tasks, storage }
    }

    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut [TaskRecord] {
        &mut self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn filtered(&self, filter: TaskFilter) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(move |task| filter.matches(task))
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }

    /// Creation timestamp in milliseconds, bumped past the highest id when it collides.
    pub fn next_id(&self, now: DateTime<Utc>) -> TaskId {
        let candidate = now.timestamp_millis();
        match self.tasks.iter().map(|task| task.id).max() {
            Some(max) if candidate <= max => max + 1,
            _ => candidate,
        }
    }

    pub fn insert(&mut self, task: TaskRecord, now: DateTime<Utc>) -> Result<()> {
        if self.get(task.id).is_some() {
            return Err(anyhow!("Task id {} already exists", task.id));
        }
        self.tasks.push(task);
        self.persist(now)
    }

    /// Flip completion and return the new state, or `None` when the id is unknown.
    pub fn toggle(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<Option<bool>> {
        let Some(task) = self.get_mut(id) else {
            return Ok(None);
        };
        task.completed = !task.completed;
        let completed = task.completed;
        self.persist(now)?;
        Ok(Some(completed))
    }

    pub fn remove(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<Option<TaskRecord>> {
        let Some(index) = self.tasks.iter().position(|task| task.id == id) else {
            return Ok(None);
        };
        let removed = self.tasks.remove(index);
        self.persist(now)?;
        Ok(Some(removed))
    }

    pub fn remove_completed(&mut self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>> {
        let (completed, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|task| task.completed);
        self.tasks = pending;
        self.persist(now)?;
        Ok(completed)
    }

    /// Full replace of the persisted collection plus the diagnostic save stamp.
    pub fn persist(&self, now: DateTime<Utc>) -> Result<()> {
        let payload = serde_json::to_string(&self.tasks).context("Failed to serialize tasks")?;
        self.storage.set(TASKS_KEY, &payload)?;
        self.storage.set(LAST_SAVE_KEY, &now.to_rfc3339())?;
        Ok(())
    }
}

fn dedupe_ids(tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let mut seen = std::collections::HashSet::new();
    let before = tasks.len();
    let unique: Vec<TaskRecord> = tasks.into_iter().filter(|task| seen.insert(task.id)).collect();
    if unique.len() != before {
        tracing::warn!(
            dropped = before - unique.len(),
            "dropped persisted tasks with duplicate ids"
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReminderTier;
    use crate::storage::{MemoryStorage, SqliteStorage};
    use crate::AppConfig;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn empty_store() -> TaskStore {
        TaskStore::load(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn corrupt_payload_loads_empty() {
        let storage = MemoryStorage::new().with_entry(TASKS_KEY, "{not json");
        let store = TaskStore::load(Box::new(storage));
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn next_id_is_unique_and_monotonic() {
        let mut store = empty_store();
        let first = store.next_id(now());
        store
            .insert(TaskRecord::new(first, "a".into(), None, now()), now())
            .unwrap();
        let second = store.next_id(now());
        assert_eq!(second, first + 1);
        let earlier = store.next_id(now() - Duration::hours(1));
        assert!(earlier > first);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = empty_store();
        let task = TaskRecord::new(7, "a".into(), None, now());
        store.insert(task.clone(), now()).unwrap();
        assert!(store.insert(task, now()).is_err());
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn persisted_collection_reloads_field_for_field() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).unwrap();

        let mut store = TaskStore::load(Box::new(SqliteStorage::initialize(&config).unwrap()));
        let mut due = TaskRecord::new(1, "Dentist".into(), Some(now() + Duration::hours(3)), now());
        due.mark_tier_fired(ReminderTier::HourBefore);
        store.insert(due, now()).unwrap();
        store
            .insert(TaskRecord::new(2, "Groceries".into(), None, now()), now())
            .unwrap();
        store.toggle(2, now()).unwrap();
        let expected = store.tasks().to_vec();
        drop(store);

        let reloaded = TaskStore::load(Box::new(SqliteStorage::initialize(&config).unwrap()));
        assert_eq!(reloaded.tasks(), expected.as_slice());
        assert_eq!(
            reloaded.storage().get(LAST_SAVE_KEY).unwrap(),
            Some(now().to_rfc3339())
        );
    }

    #[test]
    fn remove_completed_keeps_order_of_pending() {
        let mut store = empty_store();
        for (id, text) in [(1, "a"), (2, "b"), (3, "c")] {
            store
                .insert(TaskRecord::new(id, text.into(), None, now()), now())
                .unwrap();
        }
        store.toggle(2, now()).unwrap();
        let removed = store.remove_completed(now()).unwrap();
        assert_eq!(removed.len(), 1);
        let ids: Vec<_> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.stats().total, 2);
    }

    #[test]
    fn duplicate_persisted_ids_are_dropped() {
        let task = TaskRecord::new(5, "x".into(), None, now());
        let raw = serde_json::to_string(&vec![task.clone(), task]).unwrap();
        let store = TaskStore::load(Box::new(MemoryStorage::new().with_entry(TASKS_KEY, &raw)));
        assert_eq!(store.tasks().len(), 1);
    }
}
