use anyhow::Result;

use crate::config::AppConfig;
use crate::notify::{DirectSink, DisplayBackend, PermissionState};
use crate::services::TaskManager;
use crate::storage::SqliteStorage;
use crate::store::TaskStore;
use crate::sweeper::CatchUpSweeper;
use crate::timer::DetachedTimer;

/// Manager used by one-shot commands: timers never outlive the process.
pub type DetachedManager = TaskManager<DetachedTimer, DirectSink<Box<dyn DisplayBackend>>>;

/// Load the persisted store for a short-lived command. The caller is expected to run
/// [`TaskManager::startup`] before acting.
pub fn open_detached(
    config: &AppConfig,
    backend: Box<dyn DisplayBackend>,
) -> Result<DetachedManager> {
    let storage = SqliteStorage::initialize(config)?;
    let permission = PermissionState::default();
    Ok(TaskManager::new(
        TaskStore::load(Box::new(storage)),
        DetachedTimer::default(),
        DirectSink::new(backend, permission.clone()),
        permission,
        CatchUpSweeper::new(config.sweep_interval()),
    ))
}
