use tasklet_core::notify::{show_logged, DisplayBackend, Notification, NotificationSink};
use tasklet_core::PermissionState;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Show(Notification),
    Shutdown,
}

/// Sink that hands notifications to a background worker so a slow or hung display
/// command never stalls the session loop.
#[derive(Clone)]
pub struct WorkerSink {
    tx: UnboundedSender<WorkerMessage>,
    permission: PermissionState,
}

/// Owning side of the worker; stopping it drains whatever is already queued.
pub struct WorkerHandle {
    tx: UnboundedSender<WorkerMessage>,
    join: JoinHandle<()>,
}

impl WorkerSink {
    pub fn spawn<B>(backend: B, permission: PermissionState) -> (Self, WorkerHandle)
    where
        B: DisplayBackend + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let join = tokio::task::spawn_blocking(move || {
            while let Some(message) = rx.blocking_recv() {
                match message {
                    WorkerMessage::Show(notification) => show_logged(&backend, &notification),
                    WorkerMessage::Shutdown => break,
                }
            }
            tracing::debug!("notification worker stopped");
        });
        let sink = Self {
            tx: tx.clone(),
            permission,
        };
        (sink, WorkerHandle { tx, join })
    }
}

impl NotificationSink for WorkerSink {
    fn deliver(&self, notification: &Notification) {
        if !self.permission.is_granted() {
            tracing::debug!(title = %notification.title, "notification skipped: permission not granted");
            return;
        }
        if self
            .tx
            .send(WorkerMessage::Show(notification.clone()))
            .is_err()
        {
            tracing::warn!(title = %notification.title, "notification worker is gone");
        }
    }
}

impl WorkerHandle {
    pub async fn shutdown(self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if let Err(err) = self.join.await {
            tracing::warn!(error = %err, "notification worker panicked");
        }
    }
}
