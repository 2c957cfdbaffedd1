use std::collections::HashMap;
use std::time::Duration;

use tasklet_core::timer::{ReminderEvent, Timer, TimerHandle};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Timer backed by spawned tokio sleeps. An elapsed timer only sends its event back to
/// the session loop; it never touches task state itself.
pub struct TokioTimer {
    events: UnboundedSender<ReminderEvent>,
    next: u64,
    running: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(events: UnboundedSender<ReminderEvent>) -> Self {
        Self {
            events,
            next: 0,
            running: HashMap::new(),
        }
    }

    /// Timers that have not fired or been cancelled yet.
    pub fn active(&self) -> usize {
        self.running
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl Timer for TokioTimer {
    fn schedule(&mut self, delay: Duration, event: ReminderEvent) -> TimerHandle {
        self.running.retain(|_, task| !task.is_finished());

        self.next += 1;
        let handle = TimerHandle::new(self.next);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(event).is_err() {
                tracing::debug!(task_id = event.task_id, "session closed before timer fired");
            }
        });
        self.running.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.running.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.running.drain() {
            task.abort();
        }
    }
}
