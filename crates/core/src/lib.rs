pub mod capture;
pub mod commands;
pub mod config;
pub mod model;
pub mod notify;
pub mod parser;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod store;
pub mod sweeper;
pub mod timer;

pub use capture::{CaptureError, TaskInput};
pub use commands::{open_detached, DetachedManager};
pub use config::AppConfig;
pub use model::*;
pub use notify::{
    DirectSink, DisplayBackend, Notification, NotificationSink, NotifierKind, Permission,
    PermissionState, RecordingBackend,
};
pub use scheduler::ReminderScheduler;
pub use services::TaskManager;
pub use storage::{KeyValueStore, MemoryStorage, SqliteStorage};
pub use store::TaskStore;
pub use sweeper::{CatchUpSweeper, SweepReport};
pub use timer::{DetachedTimer, ManualTimer, ReminderEvent, Timer, TimerHandle};
