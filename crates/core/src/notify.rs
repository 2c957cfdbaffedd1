//! User-visible notification delivery.
//!
//! Delivery is best-effort. A [`NotificationSink`] never reports failure to its caller:
//! missing permission turns delivery into a no-op and backend errors are logged and
//! dropped, so reminder bookkeeping proceeds as if the notification had been seen.

use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::model::{ReminderTier, TaskId, TaskRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

impl Permission {
    /// Interpret the persisted `notificationsEnabled` value.
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("true") => Permission::Granted,
            Some("false") => Permission::Denied,
            _ => Permission::Default,
        }
    }

    pub fn as_stored(&self) -> Option<&'static str> {
        match self {
            Permission::Granted => Some("true"),
            Permission::Denied => Some("false"),
            Permission::Default => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Default => "default",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Permission::Default => 0,
            Permission::Granted => 1,
            Permission::Denied => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Permission::Granted,
            2 => Permission::Denied,
            _ => Permission::Default,
        }
    }
}

/// Shared, process-wide permission flag. Sinks read it on every delivery.
#[derive(Debug, Clone)]
pub struct PermissionState(Arc<AtomicU8>);

impl PermissionState {
    pub fn new(permission: Permission) -> Self {
        Self(Arc::new(AtomicU8::new(permission.to_raw())))
    }

    pub fn get(&self) -> Permission {
        Permission::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, permission: Permission) {
        self.0.store(permission.to_raw(), Ordering::Release);
    }

    pub fn is_granted(&self) -> bool {
        self.get() == Permission::Granted
    }
}

impl Default for PermissionState {
    fn default() -> Self {
        Self::new(Permission::Default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            task_id: None,
        }
    }

    pub fn reminder(task: &TaskRecord, tier: ReminderTier) -> Self {
        Self {
            title: tier.title().to_string(),
            body: tier.body(&task.text),
            task_id: Some(task.id),
        }
    }

    pub fn overdue(task: &TaskRecord) -> Self {
        Self {
            title: "Task overdue".to_string(),
            body: format!("\"{}\" should have been completed", task.text),
            task_id: Some(task.id),
        }
    }
}

pub trait NotificationSink {
    fn deliver(&self, notification: &Notification);
}

impl<S: NotificationSink + ?Sized> NotificationSink for Box<S> {
    fn deliver(&self, notification: &Notification) {
        (**self).deliver(notification)
    }
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("failed to write notification: {0}")]
    Write(#[from] io::Error),
    #[error("desktop notifications are not supported on this platform")]
    Unsupported,
    #[error("{0}")]
    Rejected(String),
}

/// Something that can put a notification in front of the user.
pub trait DisplayBackend: Send {
    fn show(&self, notification: &Notification) -> Result<(), DisplayError>;
}

impl<B: DisplayBackend + ?Sized> DisplayBackend for Box<B> {
    fn show(&self, notification: &Notification) -> Result<(), DisplayError> {
        (**self).show(notification)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Desktop,
    Console,
}

impl NotifierKind {
    pub fn backend(self) -> Box<dyn DisplayBackend> {
        match self {
            NotifierKind::Desktop => Box::new(CommandBackend),
            NotifierKind::Console => Box::new(ConsoleBackend),
        }
    }
}

/// Hands notifications to the desktop through `notify-send` or `osascript`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBackend;

impl CommandBackend {
    #[cfg(target_os = "macos")]
    fn command(notification: &Notification) -> Result<(&'static str, Command), DisplayError> {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(&notification.body),
            escape_applescript(&notification.title)
        );
        let mut command = Command::new("osascript");
        command.arg("-e").arg(script);
        Ok(("osascript", command))
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    fn command(notification: &Notification) -> Result<(&'static str, Command), DisplayError> {
        let mut command = Command::new("notify-send");
        command
            .arg("--app-name=tasklet")
            .arg(&notification.title)
            .arg(&notification.body);
        Ok(("notify-send", command))
    }

    #[cfg(not(unix))]
    fn command(_notification: &Notification) -> Result<(&'static str, Command), DisplayError> {
        Err(DisplayError::Unsupported)
    }
}

impl DisplayBackend for CommandBackend {
    fn show(&self, notification: &Notification) -> Result<(), DisplayError> {
        let (program, mut command) = Self::command(notification)?;
        let status = command
            .status()
            .map_err(|source| DisplayError::Spawn { program, source })?;
        if !status.success() {
            return Err(DisplayError::Exit { program, status });
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Prints notifications to stderr, for headless machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBackend;

impl DisplayBackend for ConsoleBackend {
    fn show(&self, notification: &Notification) -> Result<(), DisplayError> {
        use std::io::Write;
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle, "[{}] {}", notification.title, notification.body)?;
        Ok(())
    }
}

/// Keeps every notification it is asked to show. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    delivered: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attempt, then reports a failure.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.delivered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DisplayBackend for RecordingBackend {
    fn show(&self, notification: &Notification) -> Result<(), DisplayError> {
        self.delivered.lock().push(notification.clone());
        if self.failing {
            return Err(DisplayError::Rejected("recording backend set to fail".into()));
        }
        Ok(())
    }
}

/// Calls the display backend inline on the caller's thread.
pub struct DirectSink<B> {
    backend: B,
    permission: PermissionState,
}

impl<B: DisplayBackend> DirectSink<B> {
    pub fn new(backend: B, permission: PermissionState) -> Self {
        Self {
            backend,
            permission,
        }
    }
}

impl<B: DisplayBackend> NotificationSink for DirectSink<B> {
    fn deliver(&self, notification: &Notification) {
        if !self.permission.is_granted() {
            tracing::debug!(title = %notification.title, "notification skipped: permission not granted");
            return;
        }
        show_logged(&self.backend, notification);
    }
}

/// Show through `backend`, logging instead of returning failures.
pub fn show_logged<B: DisplayBackend + ?Sized>(backend: &B, notification: &Notification) {
    match backend.show(notification) {
        Ok(()) => tracing::info!(
            title = %notification.title,
            task_id = notification.task_id,
            "notification delivered"
        ),
        Err(err) => tracing::warn!(
            title = %notification.title,
            error = %err,
            "notification delivery failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Notification {
        Notification::new("Task due now", "\"Stretch\" is scheduled for now")
    }

    #[test]
    fn permission_roundtrips_through_storage_values() {
        for permission in [Permission::Granted, Permission::Denied] {
            assert_eq!(Permission::from_stored(permission.as_stored()), permission);
        }
        assert_eq!(Permission::from_stored(None), Permission::Default);
        assert_eq!(Permission::from_stored(Some("maybe")), Permission::Default);
    }

    #[test]
    fn direct_sink_noops_without_permission() {
        let backend = RecordingBackend::new();
        let permission = PermissionState::default();
        let sink = DirectSink::new(backend.clone(), permission.clone());

        sink.deliver(&sample());
        assert!(backend.is_empty());

        permission.set(Permission::Denied);
        sink.deliver(&sample());
        assert!(backend.is_empty());

        permission.set(Permission::Granted);
        sink.deliver(&sample());
        assert_eq!(backend.delivered(), vec![sample()]);
    }

    #[test]
    fn direct_sink_swallows_backend_failures() {
        let backend = RecordingBackend::failing();
        let sink = DirectSink::new(backend.clone(), PermissionState::new(Permission::Granted));
        sink.deliver(&sample());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn reminder_copy_mentions_task_text() {
        let task = TaskRecord::new(3, "Stretch".into(), Some(Utc::now()), Utc::now());
        let reminder = Notification::reminder(&task, ReminderTier::QuarterBefore);
        assert_eq!(reminder.title, "Task due in 15 minutes");
        assert!(reminder.body.contains("Stretch"));
        assert_eq!(reminder.task_id, Some(3));
        assert_eq!(Notification::overdue(&task).title, "Task overdue");
    }
}
